//! Two-Z80 arcade board: a main CPU driving video and game logic, and a
//! sound CPU fed through a command latch.
//!
//! Main CPU map:
//!   0000-7FFF ROM
//!   8000-8FFF work RAM (2 KiB, mirrored)
//!   9000-97FF video RAM
//!   A000-A007 control latch (bit 0 IRQ enable, bit 1 sound CPU run, bit 2 flip)
//!   B000-B002 inputs IN0/IN1/DSW (any write kicks the watchdog)
//!   B800      sound command (also pulses the sound CPU's NMI)
//!   port 00   interrupt vector for IM 2
//!
//! Sound CPU map:
//!   0000-1FFF ROM
//!   4000-47FF RAM (1 KiB, mirrored)
//!   6000      sound command read
//!   8000-8001 sound chip register select / data

use serde::{Deserialize, Serialize};

use crate::cpu::Cpu;
use crate::cpu_bus::CpuBus;
use crate::machine::{set_bit, Machine};
use crate::memory::{BusRead, DeviceId, MemoryMap, Region, OPEN_BUS};
use crate::peripherals::{OutputLatch, SoundChipRegisters, SoundLatch, Watchdog};
use crate::savestate::{CpuSnapshot, SaveState};
use crate::scheduler::{
    FrameEvent, FrameScheduler, SchedulerConfig, Signal, SlotConfig, SlotId, SlotTarget,
};

pub const MAIN_CLOCK_HZ: u32 = 3_072_000;
pub const SOUND_CLOCK_HZ: u32 = 1_789_772;
pub const FRAMES_PER_SECOND: u32 = 60;
pub const STEPS_PER_FRAME: u32 = 128;
/// Steps after which the sound CPU's timer interrupt is raised.
pub const SOUND_TIMER_STEPS: [u32; 4] = [31, 63, 95, 127];
const WATCHDOG_FRAMES: u32 = 16;

pub const MAIN: SlotId = 0;
pub const SOUND: SlotId = 1;

const DEV_CONTROL: DeviceId = 0;
const DEV_INPUTS: DeviceId = 1;
const DEV_SOUND_COMMAND: DeviceId = 2;
const DEV_COMMAND_READ: DeviceId = 3;
const DEV_SOUND_CHIP: DeviceId = 4;

pub const CTRL_IRQ_ENABLE: u8 = 0;
pub const CTRL_SOUND_RUN: u8 = 1;
pub const CTRL_FLIP: u8 = 2;

const VIDEO_RAM: u16 = 0x9000;

/// Everything on the board besides processors and memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwinZ80Io {
    pub control: OutputLatch,
    pub sound_command: SoundLatch,
    pub sound_nmi_pending: bool,
    /// Sound interrupt refused while the sound CPU had interrupts off.
    pub sound_irq_latched: Option<u8>,
    pub irq_vector: u8,
    pub sound_chip: SoundChipRegisters,
    pub watchdog: Watchdog,
    /// Active low.
    pub inputs: [u8; 3],
}

impl TwinZ80Io {
    fn new(inputs: [u8; 3]) -> Self {
        Self {
            control: OutputLatch::new(),
            sound_command: SoundLatch::new(),
            sound_nmi_pending: false,
            sound_irq_latched: None,
            irq_vector: 0xFF,
            sound_chip: SoundChipRegisters::new(),
            watchdog: Watchdog::new(WATCHDOG_FRAMES),
            inputs,
        }
    }
}

struct MainBus<'a> {
    map: &'a mut MemoryMap,
    io: &'a mut TwinZ80Io,
}

impl CpuBus for MainBus<'_> {
    fn read_u8(&mut self, addr: u16) -> u8 {
        match self.map.read(addr) {
            BusRead::Data(v) => v,
            BusRead::Device(access) if access.id == DEV_INPUTS => self
                .io
                .inputs
                .get(access.offset as usize)
                .copied()
                .unwrap_or(OPEN_BUS),
            // Control latch and command port are write-only.
            BusRead::Device(_) => OPEN_BUS,
        }
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        let Some(access) = self.map.write(addr, value) else {
            return;
        };
        match access.id {
            DEV_CONTROL => self.io.control.write(access.offset, value),
            DEV_INPUTS => self.io.watchdog.kick(),
            DEV_SOUND_COMMAND => {
                self.io.sound_command.write(value);
                self.io.sound_nmi_pending = true;
            }
            _ => {}
        }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        if port & 0xFF == 0x00 {
            self.io.irq_vector = value;
        }
    }
}

struct SoundBus<'a> {
    map: &'a mut MemoryMap,
    io: &'a mut TwinZ80Io,
}

impl CpuBus for SoundBus<'_> {
    fn read_u8(&mut self, addr: u16) -> u8 {
        match self.map.read(addr) {
            BusRead::Data(v) => v,
            BusRead::Device(access) => match (access.id, access.offset) {
                (DEV_COMMAND_READ, _) => self.io.sound_command.read(),
                (DEV_SOUND_CHIP, 1) => self.io.sound_chip.read_data(),
                _ => OPEN_BUS,
            },
        }
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        let Some(access) = self.map.write(addr, value) else {
            return;
        };
        match (access.id, access.offset) {
            (DEV_SOUND_CHIP, 0) => self.io.sound_chip.select(value),
            (DEV_SOUND_CHIP, _) => self.io.sound_chip.write_data(value),
            _ => {}
        }
    }

    fn interrupts_enabled(&mut self) -> Option<u8> {
        self.io.sound_irq_latched.take()
    }
}

struct Hardware {
    main_cpu: Cpu,
    sound_cpu: Cpu,
    main_map: MemoryMap,
    sound_map: MemoryMap,
    io: TwinZ80Io,
}

impl SlotTarget for Hardware {
    fn run_slot(&mut self, slot: SlotId, budget: i32) -> i32 {
        if slot == MAIN {
            let mut bus = MainBus {
                map: &mut self.main_map,
                io: &mut self.io,
            };
            return self.main_cpu.run(budget, &mut bus);
        }
        let mut bus = SoundBus {
            map: &mut self.sound_map,
            io: &mut self.io,
        };
        let mut owed = 0;
        if std::mem::take(&mut bus.io.sound_nmi_pending) {
            self.sound_cpu.nmi(&mut bus);
            owed = self.sound_cpu.last_cycles() as i32;
        }
        let budget = budget - owed;
        if budget > 0 {
            self.sound_cpu.run(budget, &mut bus)
        } else {
            -budget
        }
    }

    fn irq_slot(&mut self, slot: SlotId, data: u8) -> Option<u32> {
        if slot == MAIN {
            if !self.io.control.bit(CTRL_IRQ_ENABLE) {
                return None;
            }
            // The vector latch drives the data bus, not the event's byte.
            let vector = self.io.irq_vector;
            let mut bus = MainBus {
                map: &mut self.main_map,
                io: &mut self.io,
            };
            return self
                .main_cpu
                .interrupt(vector, &mut bus)
                .then(|| self.main_cpu.last_cycles());
        }
        let mut bus = SoundBus {
            map: &mut self.sound_map,
            io: &mut self.io,
        };
        if self.sound_cpu.interrupt(data, &mut bus) {
            Some(self.sound_cpu.last_cycles())
        } else {
            self.io.sound_irq_latched = Some(data);
            None
        }
    }

    fn nmi_slot(&mut self, slot: SlotId) -> u32 {
        if slot == MAIN {
            let mut bus = MainBus {
                map: &mut self.main_map,
                io: &mut self.io,
            };
            self.main_cpu.nmi(&mut bus);
            self.main_cpu.last_cycles()
        } else {
            let mut bus = SoundBus {
                map: &mut self.sound_map,
                io: &mut self.io,
            };
            self.sound_cpu.nmi(&mut bus);
            self.sound_cpu.last_cycles()
        }
    }

    fn is_gated(&self, slot: SlotId) -> bool {
        slot == SOUND && !self.io.control.bit(CTRL_SOUND_RUN)
    }

    fn reset_slot(&mut self, slot: SlotId) {
        if slot == MAIN {
            self.main_cpu.reset();
        } else {
            self.sound_cpu.reset();
            self.io.sound_nmi_pending = false;
            self.io.sound_irq_latched = None;
        }
    }
}

pub struct TwinZ80Board {
    scheduler: FrameScheduler,
    hw: Hardware,
    frames: u64,
}

impl TwinZ80Board {
    pub const NAME: &'static str = "twin-z80";

    pub fn new() -> Result<Self, String> {
        let hw = Hardware {
            main_cpu: Cpu::z80(),
            sound_cpu: Cpu::z80(),
            main_map: Self::main_map().map_err(|e| e.to_string())?,
            sound_map: Self::sound_map().map_err(|e| e.to_string())?,
            io: TwinZ80Io::new([0xFF; 3]),
        };
        Ok(Self {
            scheduler: FrameScheduler::new(Self::scheduler_config())?,
            hw,
            frames: 0,
        })
    }

    fn main_map() -> Result<MemoryMap, crate::memory::MapError> {
        let mut map = MemoryMap::new();
        map.add(0x0000, 0x7FFF, Region::Rom(vec![0; 0x8000]))?;
        map.add(0x8000, 0x8FFF, Region::Ram(vec![0; 0x800]))?;
        map.add(VIDEO_RAM, 0x97FF, Region::Ram(vec![0; 0x800]))?;
        map.add(0xA000, 0xA007, Region::Device(DEV_CONTROL))?;
        map.add(0xB000, 0xB002, Region::Device(DEV_INPUTS))?;
        map.add(0xB800, 0xB800, Region::Device(DEV_SOUND_COMMAND))?;
        Ok(map)
    }

    fn sound_map() -> Result<MemoryMap, crate::memory::MapError> {
        let mut map = MemoryMap::new();
        map.add(0x0000, 0x1FFF, Region::Rom(vec![0; 0x2000]))?;
        map.add(0x4000, 0x47FF, Region::Ram(vec![0; 0x400]))?;
        map.add(0x6000, 0x6000, Region::Device(DEV_COMMAND_READ))?;
        map.add(0x8000, 0x8001, Region::Device(DEV_SOUND_CHIP))?;
        Ok(map)
    }

    pub fn scheduler_config() -> SchedulerConfig {
        let mut events = vec![FrameEvent {
            step: STEPS_PER_FRAME - 1,
            slot: MAIN,
            signal: Signal::Irq(0xFF),
        }];
        events.extend(SOUND_TIMER_STEPS.iter().map(|&step| FrameEvent {
            step,
            slot: SOUND,
            signal: Signal::Irq(0xFF),
        }));
        SchedulerConfig {
            steps_per_frame: STEPS_PER_FRAME,
            slots: vec![
                SlotConfig {
                    name: "main",
                    cycles_per_frame: SchedulerConfig::cycles_per_frame(
                        MAIN_CLOCK_HZ,
                        FRAMES_PER_SECOND,
                        1,
                    ),
                },
                SlotConfig {
                    name: "sound",
                    cycles_per_frame: SchedulerConfig::cycles_per_frame(
                        SOUND_CLOCK_HZ,
                        FRAMES_PER_SECOND,
                        1,
                    ),
                },
            ],
            events,
        }
    }

    pub fn main_cpu(&self) -> &Cpu {
        &self.hw.main_cpu
    }

    pub fn sound_cpu(&self) -> &Cpu {
        &self.hw.sound_cpu
    }

    pub fn io(&self) -> &TwinZ80Io {
        &self.hw.io
    }

    pub fn video_ram(&self) -> &[u8] {
        self.hw.main_map.bytes(VIDEO_RAM).unwrap_or(&[])
    }

    pub fn flip_screen(&self) -> bool {
        self.hw.io.control.bit(CTRL_FLIP)
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }
}

impl Machine for TwinZ80Board {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_frame(&mut self) {
        self.scheduler.run_frame(&mut self.hw);
        self.frames += 1;
        log::debug!(
            "frame {}: main PC={:04X} SP={:04X} sound PC={:04X} sound {} cmd={:02X} watchdog={}",
            self.frames,
            self.hw.main_cpu.pc(),
            self.hw.main_cpu.sp(),
            self.hw.sound_cpu.pc(),
            if self.hw.io.control.bit(CTRL_SOUND_RUN) {
                "running"
            } else {
                "held"
            },
            self.hw.io.sound_command.peek(),
            self.hw.io.watchdog.frames_since_kick()
        );
        if self.hw.io.watchdog.tick() {
            log::warn!("watchdog expired at frame {}, resetting board", self.frames);
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.hw.main_cpu.reset();
        self.hw.sound_cpu.reset();
        self.hw.main_map.clear_ram();
        self.hw.sound_map.clear_ram();
        self.hw.io = TwinZ80Io::new(self.hw.io.inputs);
        self.scheduler.reset();
    }

    fn load_roms(&mut self, images: &[Vec<u8>]) -> Result<(), String> {
        match images {
            [main] => self.hw.main_map.load_rom(0x0000, main),
            [main, sound] => {
                self.hw.main_map.load_rom(0x0000, main)?;
                self.hw.sound_map.load_rom(0x0000, sound)
            }
            _ => Err(format!(
                "{} takes a main ROM and an optional sound ROM, got {} images",
                Self::NAME,
                images.len()
            )),
        }
    }

    fn set_input(&mut self, port: usize, bit: u8, pressed: bool) {
        if let Some(byte) = self.hw.io.inputs.get_mut(port) {
            set_bit(byte, bit & 7, !pressed);
        }
    }

    fn cpus(&self) -> Vec<&Cpu> {
        vec![&self.hw.main_cpu, &self.hw.sound_cpu]
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn save_state(&self) -> Result<Vec<u8>, String> {
        let mut ram = self.hw.main_map.ram_contents();
        ram.extend(self.hw.sound_map.ram_contents());
        SaveState {
            version: SaveState::<TwinZ80Io>::CURRENT_VERSION,
            board: Self::NAME.to_string(),
            frame_count: self.frames,
            cpus: vec![
                CpuSnapshot::capture(&self.hw.main_cpu),
                CpuSnapshot::capture(&self.hw.sound_cpu),
            ],
            scheduler: self.scheduler.snapshot(),
            ram,
            peripherals: self.hw.io.clone(),
        }
        .to_bytes()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), String> {
        let state = SaveState::<TwinZ80Io>::from_bytes(data)?;
        state.check_board(Self::NAME)?;
        let [main, sound] = state.cpus.as_slice() else {
            return Err(format!("expected 2 processors, found {}", state.cpus.len()));
        };
        let split = self.hw.main_map.ram_block_count();
        if state.ram.len() < split {
            return Err("save state RAM list is too short".to_string());
        }
        main.restore(&mut self.hw.main_cpu)?;
        sound.restore(&mut self.hw.sound_cpu)?;
        self.hw.main_map.restore_ram(&state.ram[..split])?;
        self.hw.sound_map.restore_ram(&state.ram[split..])?;
        self.scheduler.restore(&state.scheduler)?;
        self.hw.io = state.peripherals;
        self.frames = state.frame_count;
        Ok(())
    }
}
