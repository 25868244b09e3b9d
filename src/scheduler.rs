//! Per-frame interleaving of several processors.
//!
//! A frame is cut into `steps_per_frame` equal steps. In every step each slot
//! (one processor) runs for its share of the frame's cycles, in slot order,
//! then the events scheduled for that slot at that step fire. Each slot keeps
//! a signed carry of cycles it spent beyond its budget (or could not spend),
//! so the long-run rate matches the configured clock exactly.

use serde::{Deserialize, Serialize};

use crate::debug_flags;

pub type SlotId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Maskable interrupt with this data-bus byte.
    Irq(u8),
    Nmi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEvent {
    pub step: u32,
    pub slot: SlotId,
    pub signal: Signal,
}

#[derive(Debug, Clone)]
pub struct SlotConfig {
    pub name: &'static str,
    pub cycles_per_frame: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub steps_per_frame: u32,
    pub slots: Vec<SlotConfig>,
    pub events: Vec<FrameEvent>,
}

impl SchedulerConfig {
    /// Cycles per frame for a clock in Hz at a frame rate given as a
    /// rational `num/den` frames per second, rounded down.
    pub fn cycles_per_frame(clock_hz: u32, fps_num: u32, fps_den: u32) -> u32 {
        ((clock_hz as u64 * fps_den as u64) / fps_num as u64) as u32
    }
}

/// What a board exposes to the scheduler for each slot.
pub trait SlotTarget {
    /// Runs the slot's processor for `budget` cycles and returns the overshoot.
    fn run_slot(&mut self, slot: SlotId, budget: i32) -> i32;

    /// Maskable interrupt; `Some(cost)` when accepted.
    fn irq_slot(&mut self, slot: SlotId, data: u8) -> Option<u32>;

    /// Non-maskable interrupt; returns its cost.
    fn nmi_slot(&mut self, slot: SlotId) -> u32;

    /// True while the board holds the slot's processor in reset.
    fn is_gated(&self, slot: SlotId) -> bool {
        let _ = slot;
        false
    }

    fn reset_slot(&mut self, slot: SlotId);

    /// Called once at the end of every step, after all slots.
    fn end_step(&mut self, step: u32) {
        let _ = step;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    /// Cycles owed from earlier steps; negative means cycles still due.
    pub carry: i32,
    /// Sub-step remainder of the exact frame distribution.
    acc: u32,
    /// Gate level seen on the previous step.
    was_gated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub slots: Vec<SlotState>,
    pub frame: u64,
}

pub struct FrameScheduler {
    config: SchedulerConfig,
    events_by_step: Vec<Vec<(SlotId, Signal)>>,
    slots: Vec<SlotState>,
    frame: u64,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, String> {
        if config.steps_per_frame == 0 {
            return Err("steps_per_frame must be at least 1".to_string());
        }
        if config.slots.is_empty() {
            return Err("scheduler needs at least one slot".to_string());
        }
        let mut events_by_step = vec![Vec::new(); config.steps_per_frame as usize];
        for ev in &config.events {
            if ev.step >= config.steps_per_frame {
                return Err(format!(
                    "event step {} out of range (steps_per_frame {})",
                    ev.step, config.steps_per_frame
                ));
            }
            if ev.slot >= config.slots.len() {
                return Err(format!("event targets unknown slot {}", ev.slot));
            }
            events_by_step[ev.step as usize].push((ev.slot, ev.signal));
        }
        let slots = vec![SlotState::default(); config.slots.len()];
        Ok(Self {
            config,
            events_by_step,
            slots,
            frame: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn carry(&self, slot: SlotId) -> i32 {
        self.slots[slot].carry
    }

    /// Clears carries and gate history. Only a machine reset does this.
    pub fn reset(&mut self) {
        for s in &mut self.slots {
            *s = SlotState::default();
        }
        self.frame = 0;
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            slots: self.slots.clone(),
            frame: self.frame,
        }
    }

    pub fn restore(&mut self, snap: &SchedulerSnapshot) -> Result<(), String> {
        if snap.slots.len() != self.slots.len() {
            return Err(format!(
                "scheduler snapshot has {} slots, expected {}",
                snap.slots.len(),
                self.slots.len()
            ));
        }
        self.slots.clone_from(&snap.slots);
        self.frame = snap.frame;
        Ok(())
    }

    pub fn run_frame(&mut self, target: &mut impl SlotTarget) {
        for step in 0..self.config.steps_per_frame {
            self.run_step(step, target);
        }
        self.frame += 1;
    }

    fn run_step(&mut self, step: u32, target: &mut impl SlotTarget) {
        let steps = self.config.steps_per_frame;
        for slot in 0..self.slots.len() {
            let gated = target.is_gated(slot);
            let state = &mut self.slots[slot];
            let share = {
                state.acc += self.config.slots[slot].cycles_per_frame;
                let share = state.acc / steps;
                state.acc %= steps;
                share as i32
            };

            if gated {
                if !state.was_gated && debug_flags::trace_irq() {
                    log::trace!(
                        "frame {} step {}: {} held in reset",
                        self.frame,
                        step,
                        self.config.slots[slot].name
                    );
                }
                state.was_gated = true;
                continue;
            }
            if state.was_gated {
                state.was_gated = false;
                log::debug!(
                    "frame {} step {}: {} released from reset",
                    self.frame,
                    step,
                    self.config.slots[slot].name
                );
                target.reset_slot(slot);
            }

            let budget = share - state.carry;
            state.carry = if budget > 0 {
                target.run_slot(slot, budget)
            } else {
                -budget
            };

            for &(ev_slot, signal) in &self.events_by_step[step as usize] {
                if ev_slot != slot {
                    continue;
                }
                let cost = match signal {
                    Signal::Irq(data) => target.irq_slot(slot, data),
                    Signal::Nmi => Some(target.nmi_slot(slot)),
                };
                if let Some(cost) = cost {
                    self.slots[slot].carry += cost as i32;
                }
                if debug_flags::trace_irq() {
                    log::trace!(
                        "frame {} step {}: {:?} -> {} ({})",
                        self.frame,
                        step,
                        signal,
                        self.config.slots[slot].name,
                        if cost.is_some() { "taken" } else { "refused" }
                    );
                }
            }
        }
        target.end_step(step);
    }
}
