//! Processor front end: reset, single-step, budgeted run and interrupt entry
//! for one Z80 or 8080 instance.

use crate::cpu_bus::CpuBus;
use crate::cpu_core::{self as core, CoreState, IndexMode, Model};
use crate::debug_flags;

pub mod opcodes;
pub mod prefixed;

#[cfg(test)]
mod opcode_tests;

pub use crate::cpu_core::StatusFlags;

/// Cost of one halted no-op (an internal NOP cycle on both families).
pub const HALT_CYCLES: u32 = 4;
/// Address called by an NMI.
pub const NMI_VECTOR: u16 = 0x0066;
/// Cost of NMI acceptance: push PC and jump.
pub const NMI_CYCLES: u32 = 11;
/// Address called in interrupt mode 1.
pub const IM1_VECTOR: u16 = 0x0038;
/// Cost of the call part of a mode 1 or mode 2 dispatch (same as RST).
const INTERRUPT_CALL_CYCLES: u32 = 11;
/// Acknowledge-cycle cost added by each interrupt mode.
pub const IM0_ACK_CYCLES: u32 = 2;
pub const IM1_ACK_CYCLES: u32 = 2;
pub const IM2_ACK_CYCLES: u32 = 8;

pub struct Cpu {
    pub state: CoreState,
    last_cycles: u32,
}

impl Cpu {
    pub fn new(model: Model) -> Self {
        Self {
            state: CoreState::new(model),
            last_cycles: 0,
        }
    }

    pub fn z80() -> Self {
        Self::new(Model::Z80)
    }

    pub fn i8080() -> Self {
        Self::new(Model::I8080)
    }

    pub fn model(&self) -> Model {
        self.state.model
    }

    /// Power-on state: registers zero, interrupts off in mode 0, SP at the
    /// sentinel, counters cleared. Does not touch the bus.
    pub fn reset(&mut self) {
        self.state = CoreState::new(self.state.model);
        self.last_cycles = 0;
    }

    /// Executes one instruction (or one halted no-op) and returns its cost,
    /// including any interrupt the bus asked for through
    /// [`CpuBus::interrupts_enabled`].
    pub fn step(&mut self, bus: &mut impl CpuBus) -> u32 {
        let enabled_before = self.state.iff1;
        let mut cycles = self.execute(bus);
        self.state.cycles = self.state.cycles.wrapping_add(cycles as u64);
        self.last_cycles = cycles;
        self.state.bump_refresh();

        if !enabled_before && self.state.iff1 {
            if let Some(data) = bus.interrupts_enabled() {
                if debug_flags::trace_irq() {
                    log::trace!(
                        "{:?}: retrying latched interrupt {:02X} after re-enable",
                        self.state.model,
                        data
                    );
                }
                if self.interrupt(data, bus) {
                    cycles += self.last_cycles;
                    self.last_cycles = cycles;
                }
            }
        }
        cycles
    }

    fn execute(&mut self, bus: &mut dyn CpuBus) -> u32 {
        if self.state.halted {
            return HALT_CYCLES;
        }
        let pc = self.state.pc;
        let opcode = core::fetch_u8(&mut self.state, bus);
        if debug_flags::trace_cpu() {
            log::trace!(
                "{:?} {:04X}: {:02X} AF={:04X} BC={:04X} DE={:04X} HL={:04X} SP={:04X}",
                self.state.model,
                pc,
                opcode,
                self.state.af(),
                self.state.bc(),
                self.state.de(),
                self.state.hl(),
                self.state.sp
            );
        }
        let entry = opcodes::base_table(self.state.model)[opcode as usize];
        self.dispatch(opcode, entry, bus)
    }

    fn dispatch(&mut self, opcode: u8, entry: opcodes::Opcode, bus: &mut dyn CpuBus) -> u32 {
        self.state.opcode = opcode;
        self.state.extra_cycles = 0;
        (entry.exec)(&mut self.state, bus);
        self.state.index = IndexMode::Hl;
        entry.cycles as u32 + self.state.extra_cycles
    }

    /// Runs whole instructions until at least `budget` cycles have been
    /// consumed and returns the overshoot. While halted the remaining budget
    /// is accounted in one block; this can be off by a few cycles against a
    /// real instruction stream and interrupt windows are tuned against it.
    pub fn run(&mut self, budget: i32, bus: &mut impl CpuBus) -> i32 {
        if budget <= 0 {
            return 0;
        }
        let mut done: i32 = 0;
        while done < budget {
            if self.state.halted {
                let rest = budget - done;
                self.state.cycles = self.state.cycles.wrapping_add(rest as u64);
                self.last_cycles = rest as u32;
                self.state.bump_refresh();
                done += rest;
            } else {
                done += self.step(bus) as i32;
            }
        }
        done - budget
    }

    /// Maskable interrupt with `data` on the data bus. Refused (no state
    /// change) while IFF1 is clear.
    pub fn interrupt(&mut self, data: u8, bus: &mut impl CpuBus) -> bool {
        if !self.state.iff1 {
            return false;
        }
        self.state.iff1 = false;
        self.state.iff2 = false;
        self.state.halted = false;

        let mode = if self.state.model == Model::I8080 {
            0
        } else {
            self.state.im
        };
        let cycles = match mode {
            0 => {
                // The data bus byte runs as an instruction, usually RST n.
                let entry = opcodes::base_table(self.state.model)[data as usize];
                let ack = if self.state.model == Model::Z80 {
                    IM0_ACK_CYCLES
                } else {
                    0
                };
                self.dispatch(data, entry, bus) + ack
            }
            1 => {
                core::call(&mut self.state, bus, IM1_VECTOR);
                INTERRUPT_CALL_CYCLES + IM1_ACK_CYCLES
            }
            _ => {
                let table = ((self.state.i as u16) << 8) | (data & 0xFE) as u16;
                let vector = bus.read_u16(table);
                core::call(&mut self.state, bus, vector);
                INTERRUPT_CALL_CYCLES + IM2_ACK_CYCLES
            }
        };
        if debug_flags::trace_irq() {
            log::trace!(
                "{:?}: IRQ data={:02X} mode={} -> PC={:04X} ({} cycles)",
                self.state.model,
                data,
                mode,
                self.state.pc,
                cycles
            );
        }
        self.last_cycles = cycles;
        self.state.cycles = self.state.cycles.wrapping_add(cycles as u64);
        true
    }

    /// Non-maskable interrupt. IFF2 keeps the pre-NMI IFF1 so RETN can put it
    /// back.
    pub fn nmi(&mut self, bus: &mut impl CpuBus) {
        self.state.iff2 = self.state.iff1;
        self.state.iff1 = false;
        self.state.halted = false;
        core::call(&mut self.state, bus, NMI_VECTOR);
        if debug_flags::trace_irq() {
            log::trace!("{:?}: NMI from PC={:04X}", self.state.model, self.state.pc);
        }
        self.last_cycles = NMI_CYCLES;
        self.state.cycles = self.state.cycles.wrapping_add(NMI_CYCLES as u64);
    }

    pub fn pc(&self) -> u16 {
        self.state.pc
    }

    pub fn sp(&self) -> u16 {
        self.state.sp
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    pub fn iff1(&self) -> bool {
        self.state.iff1
    }

    pub fn iff2(&self) -> bool {
        self.state.iff2
    }

    pub fn interrupt_mode(&self) -> u8 {
        self.state.im
    }

    pub fn refresh(&self) -> u8 {
        self.state.r
    }

    /// Cycles charged by the most recent step, run block or interrupt.
    pub fn last_cycles(&self) -> u32 {
        self.last_cycles
    }

    pub fn total_cycles(&self) -> u64 {
        self.state.cycles
    }

    pub(crate) fn set_last_cycles(&mut self, cycles: u32) {
        self.last_cycles = cycles;
    }
}
