//! Single-8080 board in the style of the 1978 invaders hardware.
//!
//!   0000-1FFF ROM
//!   2000-3FFF RAM, video RAM from 2400 (mirrored at 4000-5FFF)
//!
//! Ports: in 0-2 inputs, in 3 shift register result; out 2 shift offset,
//! out 3/5 sound latches, out 4 shift data, out 6 watchdog.
//!
//! The CPU takes RST 1 when the beam reaches mid-screen and RST 2 at vblank.

use serde::{Deserialize, Serialize};

use crate::cpu::Cpu;
use crate::cpu_bus::CpuBus;
use crate::machine::{set_bit, Machine};
use crate::memory::{BusRead, MemoryMap, Region, OPEN_BUS};
use crate::peripherals::{ShiftRegister, SoundLatch, Watchdog};
use crate::savestate::{CpuSnapshot, SaveState};
use crate::scheduler::{
    FrameEvent, FrameScheduler, SchedulerConfig, Signal, SlotConfig, SlotId, SlotTarget,
};

pub const CPU_CLOCK_HZ: u32 = 1_996_800;
pub const FRAMES_PER_SECOND: u32 = 60;
/// Half a frame per step: the interrupts come at mid-screen and vblank.
pub const STEPS_PER_FRAME: u32 = 2;
pub const MID_SCREEN_RST: u8 = 0xCF;
pub const VBLANK_RST: u8 = 0xD7;
pub const WATCHDOG_FRAMES: u32 = 64;

const RAM_START: u16 = 0x2000;
const VIDEO_OFFSET: usize = 0x0400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvadersIo {
    pub shift: ShiftRegister,
    pub sound1: SoundLatch,
    pub sound2: SoundLatch,
    pub watchdog: Watchdog,
    /// Active high. Port 1 bit 3 is tied high.
    pub inputs: [u8; 3],
}

impl InvadersIo {
    fn new(inputs: [u8; 3]) -> Self {
        Self {
            shift: ShiftRegister::new(),
            sound1: SoundLatch::new(),
            sound2: SoundLatch::new(),
            watchdog: Watchdog::new(WATCHDOG_FRAMES),
            inputs,
        }
    }
}

struct InvadersBus<'a> {
    map: &'a mut MemoryMap,
    io: &'a mut InvadersIo,
}

impl CpuBus for InvadersBus<'_> {
    fn read_u8(&mut self, addr: u16) -> u8 {
        match self.map.read(addr) {
            BusRead::Data(v) => v,
            BusRead::Device(_) => OPEN_BUS,
        }
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        self.map.write(addr, value);
    }

    fn read_port(&mut self, port: u16) -> u8 {
        match port {
            0..=2 => self.io.inputs[port as usize],
            3 => self.io.shift.read(),
            _ => OPEN_BUS,
        }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        match port {
            2 => self.io.shift.set_offset(value),
            3 => self.io.sound1.write(value),
            4 => self.io.shift.write_data(value),
            5 => self.io.sound2.write(value),
            6 => self.io.watchdog.kick(),
            _ => log::trace!("unhandled OUT {:02X},{:02X}", port, value),
        }
    }
}

struct Hardware {
    cpu: Cpu,
    map: MemoryMap,
    io: InvadersIo,
}

impl Hardware {
    fn bus(&mut self) -> (&mut Cpu, InvadersBus<'_>) {
        (
            &mut self.cpu,
            InvadersBus {
                map: &mut self.map,
                io: &mut self.io,
            },
        )
    }
}

impl SlotTarget for Hardware {
    fn run_slot(&mut self, _slot: SlotId, budget: i32) -> i32 {
        let (cpu, mut bus) = self.bus();
        cpu.run(budget, &mut bus)
    }

    fn irq_slot(&mut self, _slot: SlotId, data: u8) -> Option<u32> {
        let (cpu, mut bus) = self.bus();
        cpu.interrupt(data, &mut bus).then(|| cpu.last_cycles())
    }

    fn nmi_slot(&mut self, _slot: SlotId) -> u32 {
        let (cpu, mut bus) = self.bus();
        cpu.nmi(&mut bus);
        cpu.last_cycles()
    }

    fn reset_slot(&mut self, _slot: SlotId) {
        self.cpu.reset();
    }
}

pub struct InvadersBoard {
    scheduler: FrameScheduler,
    hw: Hardware,
    frames: u64,
}

impl InvadersBoard {
    pub const NAME: &'static str = "invaders";

    pub fn new() -> Result<Self, String> {
        let mut map = MemoryMap::new();
        map.add(0x0000, 0x1FFF, Region::Rom(vec![0; 0x2000]))
            .and_then(|_| map.add(RAM_START, 0x5FFF, Region::Ram(vec![0; 0x2000])))
            .map_err(|e| e.to_string())?;
        Ok(Self {
            scheduler: FrameScheduler::new(Self::scheduler_config())?,
            hw: Hardware {
                cpu: Cpu::i8080(),
                map,
                io: InvadersIo::new([0x0E, 0x08, 0x00]),
            },
            frames: 0,
        })
    }

    pub fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            steps_per_frame: STEPS_PER_FRAME,
            slots: vec![SlotConfig {
                name: "8080",
                cycles_per_frame: SchedulerConfig::cycles_per_frame(
                    CPU_CLOCK_HZ,
                    FRAMES_PER_SECOND,
                    1,
                ),
            }],
            events: vec![
                FrameEvent {
                    step: 0,
                    slot: 0,
                    signal: Signal::Irq(MID_SCREEN_RST),
                },
                FrameEvent {
                    step: 1,
                    slot: 0,
                    signal: Signal::Irq(VBLANK_RST),
                },
            ],
        }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.hw.cpu
    }

    pub fn io(&self) -> &InvadersIo {
        &self.hw.io
    }

    /// 256x224 1bpp frame buffer, rotated as stored by the hardware.
    pub fn video_ram(&self) -> &[u8] {
        self.hw
            .map
            .bytes(RAM_START)
            .map(|ram| &ram[VIDEO_OFFSET..])
            .unwrap_or(&[])
    }

    pub fn ram(&self) -> &[u8] {
        self.hw.map.bytes(RAM_START).unwrap_or(&[])
    }
}

impl Machine for InvadersBoard {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_frame(&mut self) {
        self.scheduler.run_frame(&mut self.hw);
        self.frames += 1;
        log::debug!(
            "frame {}: PC={:04X} SP={:04X} cycles={} sound={:02X}/{:02X} watchdog={}",
            self.frames,
            self.hw.cpu.pc(),
            self.hw.cpu.sp(),
            self.hw.cpu.total_cycles(),
            self.hw.io.sound1.peek(),
            self.hw.io.sound2.peek(),
            self.hw.io.watchdog.frames_since_kick()
        );
        if self.hw.io.watchdog.tick() {
            log::warn!("watchdog expired at frame {}, resetting board", self.frames);
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.hw.cpu.reset();
        self.hw.map.clear_ram();
        self.hw.io = InvadersIo::new(self.hw.io.inputs);
        self.scheduler.reset();
    }

    fn load_roms(&mut self, images: &[Vec<u8>]) -> Result<(), String> {
        // Split dumps (h, g, f, e) are concatenated in address order.
        if images.is_empty() {
            return Err(format!("{} needs at least one ROM image", Self::NAME));
        }
        let image: Vec<u8> = images.concat();
        if image.len() > 0x2000 {
            return Err(format!(
                "ROM images total {} bytes, board holds 8192",
                image.len()
            ));
        }
        self.hw.map.load_rom(0x0000, &image)
    }

    fn set_input(&mut self, port: usize, bit: u8, pressed: bool) {
        if let Some(byte) = self.hw.io.inputs.get_mut(port) {
            set_bit(byte, bit & 7, pressed);
        }
    }

    fn cpus(&self) -> Vec<&Cpu> {
        vec![&self.hw.cpu]
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn save_state(&self) -> Result<Vec<u8>, String> {
        SaveState {
            version: SaveState::<InvadersIo>::CURRENT_VERSION,
            board: Self::NAME.to_string(),
            frame_count: self.frames,
            cpus: vec![CpuSnapshot::capture(&self.hw.cpu)],
            scheduler: self.scheduler.snapshot(),
            ram: self.hw.map.ram_contents(),
            peripherals: self.hw.io.clone(),
        }
        .to_bytes()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), String> {
        let state = SaveState::<InvadersIo>::from_bytes(data)?;
        state.check_board(Self::NAME)?;
        let [cpu] = state.cpus.as_slice() else {
            return Err(format!("expected 1 processor, found {}", state.cpus.len()));
        };
        cpu.restore(&mut self.hw.cpu)?;
        self.hw.map.restore_ram(&state.ram)?;
        self.scheduler.restore(&state.scheduler)?;
        self.hw.io = state.peripherals;
        self.frames = state.frame_count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(chunks: &[(u16, &[u8])]) -> InvadersBoard {
        let mut rom = vec![0u8; 0x2000];
        for (addr, bytes) in chunks {
            rom[*addr as usize..*addr as usize + bytes.len()].copy_from_slice(bytes);
        }
        let mut board = InvadersBoard::new().unwrap();
        board.load_roms(&[rom]).unwrap();
        board
    }

    #[test]
    fn test_shift_register_through_ports() {
        let program: &[u8] = &[
            0x3E, 0xAB, 0xD3, 0x04, // MVI A,AB ; OUT 4
            0x3E, 0xCD, 0xD3, 0x04, // MVI A,CD ; OUT 4
            0x3E, 0x04, 0xD3, 0x02, // MVI A,4 ; OUT 2
            0xDB, 0x03, // IN 3
            0x32, 0x00, 0x20, // STA 2000
            0x76, // HLT
        ];
        let mut board = board_with(&[(0x0000, program)]);
        board.run_frame();
        assert_eq!(board.ram()[0], 0xDA);
        assert!(board.cpu().is_halted());
        assert_eq!(board.cpu().pc(), 0x0012);
    }

    #[test]
    fn test_mid_screen_and_vblank_rsts() {
        let main: &[u8] = &[
            0x31, 0x00, 0x24, // LXI SP,2400
            0xFB, // EI
            0xC3, 0x04, 0x00, // JMP 0004
        ];
        let counter = |addr: u8| -> Vec<u8> {
            vec![
                0xF5, // PUSH PSW
                0x3A, addr, 0x20, // LDA 20xx
                0x3C, // INR A
                0x32, addr, 0x20, // STA 20xx
                0xF1, // POP PSW
                0xFB, // EI
                0xC9, // RET
            ]
        };
        let rst1 = counter(0x01);
        let rst2 = counter(0x02);
        let mut board = board_with(&[
            (0x0000, main),
            (0x0008, &[0xC3, 0x00, 0x01]),
            (0x0010, &[0xC3, 0x20, 0x01]),
            (0x0100, &rst1),
            (0x0120, &rst2),
        ]);
        for _ in 0..3 {
            board.run_frame();
        }
        // The last vblank handler has not run yet.
        assert_eq!(board.ram()[1], 3);
        assert_eq!(board.ram()[2], 2);
        assert_eq!(board.cpu().pc(), 0x0010);
        assert_eq!(board.ram()[0x2400 - 0x2000 - 2], 0x04);
    }

    #[test]
    fn test_interrupts_ignored_with_di() {
        let mut board = board_with(&[(0x0000, &[0xF3, 0xC3, 0x01, 0x00])]);
        board.run_frame();
        assert_eq!(board.cpu().pc(), 0x0001);
        assert_eq!(board.cpu().sp(), crate::cpu_core::SP_SENTINEL);
    }

    #[test]
    fn test_ram_mirror() {
        // MVI A,5A ; STA 4010 ; HLT
        let mut board = board_with(&[(0x0000, &[0x3E, 0x5A, 0x32, 0x10, 0x40, 0x76])]);
        board.run_frame();
        assert_eq!(board.ram()[0x10], 0x5A);
    }

    #[test]
    fn test_watchdog_resets_unless_kicked() {
        // MVI A,1 ; STA 2000 ; JMP $
        let idle: &[u8] = &[0x3E, 0x01, 0x32, 0x00, 0x20, 0xC3, 0x05, 0x00];
        let mut board = board_with(&[(0x0000, idle)]);
        for _ in 1..WATCHDOG_FRAMES {
            board.run_frame();
        }
        assert_eq!(board.io().watchdog.frames_since_kick(), WATCHDOG_FRAMES - 1);
        board.run_frame();
        assert_eq!(board.io().watchdog.frames_since_kick(), 0);
        assert_eq!(board.cpu().total_cycles(), 0);
        assert_eq!(board.ram()[0], 0);
        assert_eq!(board.frame_count(), WATCHDOG_FRAMES as u64);

        // OUT 6 ; JMP 0000
        let kicking: &[u8] = &[0xD3, 0x06, 0xC3, 0x00, 0x00];
        let mut board = board_with(&[(0x0000, kicking)]);
        for _ in 0..WATCHDOG_FRAMES {
            board.run_frame();
        }
        assert!(board.cpu().total_cycles() > 0);
        assert_eq!(board.io().watchdog.frames_since_kick(), 1);
    }

    #[test]
    fn test_inputs_active_high() {
        let mut board = InvadersBoard::new().unwrap();
        board.set_input(1, 0, true);
        assert_eq!(board.io().inputs[1], 0x09);
        board.set_input(1, 0, false);
        assert_eq!(board.io().inputs[1], 0x08);
    }

    #[test]
    fn test_load_roms_concatenates_and_checks_size() {
        let mut board = InvadersBoard::new().unwrap();
        board
            .load_roms(&[vec![0x11; 0x800], vec![0x22; 0x800]])
            .unwrap();
        assert_eq!(board.hw.map.bytes(0x0000).unwrap()[0x800], 0x22);
        assert!(board.load_roms(&[vec![0; 0x2001]]).is_err());
        assert!(board.load_roms(&[]).is_err());
    }

    #[test]
    fn test_save_state_round_trip() {
        let program: &[u8] = &[
            0x31, 0x00, 0x24, 0xFB, // LXI SP,2400 ; EI
            0x21, 0x00, 0x24, // LXI H,2400
            0x34, // INR M
            0x23, // INX H
            0xC3, 0x07, 0x00, // JMP 0007
        ];
        let isr: &[u8] = &[0xFB, 0xC9];
        let mut a = board_with(&[(0x0000, program), (0x0008, isr), (0x0010, isr)]);
        a.run_frame();
        let saved = a.save_state().unwrap();
        a.run_frame();

        let mut b = board_with(&[(0x0000, program), (0x0008, isr), (0x0010, isr)]);
        b.load_state(&saved).unwrap();
        b.run_frame();
        assert_eq!(a.save_state().unwrap(), b.save_state().unwrap());
        assert_eq!(a.video_ram(), b.video_ram());

        let mut other = crate::boards::twin_z80::TwinZ80Board::new().unwrap();
        assert!(other.load_state(&saved).is_err());
    }
}
