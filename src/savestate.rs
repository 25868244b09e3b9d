use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};

use crate::cpu::Cpu;
use crate::cpu_core::Model;
use crate::scheduler::SchedulerSnapshot;

/// Full machine snapshot. `B` carries the board's own peripheral state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState<B> {
    pub version: u32,
    pub board: String,
    pub frame_count: u64,
    pub cpus: Vec<CpuSnapshot>,
    pub scheduler: SchedulerSnapshot,
    pub ram: Vec<Vec<u8>>,
    pub peripherals: B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub model: Model,
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
    pub memptr: u16,
    pub cycles: u64,
    pub last_cycles: u32,
}

fn pair(hi: u8, lo: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

impl CpuSnapshot {
    pub fn capture(cpu: &Cpu) -> Self {
        let s = &cpu.state;
        Self {
            model: s.model,
            af: s.af(),
            bc: s.bc(),
            de: s.de(),
            hl: s.hl(),
            af_alt: pair(s.a_alt, s.f_alt),
            bc_alt: pair(s.b_alt, s.c_alt),
            de_alt: pair(s.d_alt, s.e_alt),
            hl_alt: pair(s.h_alt, s.l_alt),
            ix: s.ix,
            iy: s.iy,
            sp: s.sp,
            pc: s.pc,
            i: s.i,
            r: s.r,
            iff1: s.iff1,
            iff2: s.iff2,
            im: s.im,
            halted: s.halted,
            memptr: s.memptr,
            cycles: s.cycles,
            last_cycles: cpu.last_cycles(),
        }
    }

    pub fn restore(&self, cpu: &mut Cpu) -> Result<(), String> {
        if cpu.model() != self.model {
            return Err(format!(
                "snapshot is for {:?}, processor is {:?}",
                self.model,
                cpu.model()
            ));
        }
        cpu.reset();
        let s = &mut cpu.state;
        // Raw stores: set_af would re-mask 8080 flags.
        s.a = (self.af >> 8) as u8;
        s.f = self.af as u8;
        s.set_bc(self.bc);
        s.set_de(self.de);
        s.set_hl(self.hl);
        s.a_alt = (self.af_alt >> 8) as u8;
        s.f_alt = self.af_alt as u8;
        s.b_alt = (self.bc_alt >> 8) as u8;
        s.c_alt = self.bc_alt as u8;
        s.d_alt = (self.de_alt >> 8) as u8;
        s.e_alt = self.de_alt as u8;
        s.h_alt = (self.hl_alt >> 8) as u8;
        s.l_alt = self.hl_alt as u8;
        s.ix = self.ix;
        s.iy = self.iy;
        s.sp = self.sp;
        s.pc = self.pc;
        s.i = self.i;
        s.r = self.r;
        s.iff1 = self.iff1;
        s.iff2 = self.iff2;
        s.im = self.im;
        s.halted = self.halted;
        s.memptr = self.memptr;
        s.cycles = self.cycles;
        cpu.set_last_cycles(self.last_cycles);
        Ok(())
    }
}

impl<B: Serialize + DeserializeOwned> SaveState<B> {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| format!("Failed to serialize save state: {}", e))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let state: SaveState<B> = bincode::deserialize(data)
            .map_err(|e| format!("Failed to deserialize save state: {}", e))?;
        if state.version > Self::CURRENT_VERSION {
            return Err(format!(
                "Save state version {} is not supported (current: {})",
                state.version,
                Self::CURRENT_VERSION
            ));
        }
        Ok(state)
    }

    /// Rejects a snapshot taken on another board.
    pub fn check_board(&self, expected: &str) -> Result<(), String> {
        if self.board != expected {
            return Err(format!(
                "save state is for board '{}', not '{}'",
                self.board, expected
            ));
        }
        Ok(())
    }
}

pub fn save_to_file(filename: &str, bytes: &[u8]) -> Result<(), String> {
    let mut file =
        File::create(filename).map_err(|e| format!("Failed to create save file: {}", e))?;
    file.write_all(bytes)
        .map_err(|e| format!("Failed to write save file: {}", e))?;
    log::info!("Save state written to: {}", filename);
    Ok(())
}

pub fn load_from_file(filename: &str) -> Result<Vec<u8>, String> {
    let mut file =
        File::open(filename).map_err(|e| format!("Failed to open save file: {}", e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| format!("Failed to read save file: {}", e))?;
    log::info!("Save state loaded from: {}", filename);
    Ok(data)
}

/// FNV-1a over serialized state, printed by the headless runner so two runs
/// can be compared at a glance.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811C_9DC5u32, |h, &b| {
        (h ^ b as u32).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerSnapshot;

    #[test]
    fn test_cpu_snapshot_restores_exactly() {
        let mut cpu = Cpu::z80();
        cpu.state.set_af(0x12D7);
        cpu.state.set_hl(0xBEEF);
        cpu.state.h_alt = 0x77;
        cpu.state.ix = 0x1234;
        cpu.state.iff1 = true;
        cpu.state.im = 2;
        cpu.state.pc = 0x4000;
        cpu.state.r = 0x85;
        let snap = CpuSnapshot::capture(&cpu);

        let mut other = Cpu::z80();
        snap.restore(&mut other).unwrap();
        assert_eq!(CpuSnapshot::capture(&other), snap);
        assert_eq!(other.state.h_alt, 0x77);
        assert_eq!(other.pc(), 0x4000);
    }

    #[test]
    fn test_cpu_snapshot_model_mismatch() {
        let snap = CpuSnapshot::capture(&Cpu::z80());
        let mut cpu = Cpu::i8080();
        assert!(snap.restore(&mut cpu).is_err());
    }

    #[test]
    fn test_bytes_roundtrip_and_version_check() {
        let state = SaveState {
            version: SaveState::<u8>::CURRENT_VERSION,
            board: "test".to_string(),
            frame_count: 7,
            cpus: vec![CpuSnapshot::capture(&Cpu::i8080())],
            scheduler: SchedulerSnapshot::default(),
            ram: vec![vec![1, 2, 3]],
            peripherals: 0x5Au8,
        };
        let bytes = state.to_bytes().unwrap();
        let back = SaveState::<u8>::from_bytes(&bytes).unwrap();
        assert_eq!(back, state);
        assert!(back.check_board("test").is_ok());
        assert!(back.check_board("other").is_err());

        let mut future = state.clone();
        future.version = 99;
        let bytes = future.to_bytes().unwrap();
        assert!(SaveState::<u8>::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_checksum_differs_on_change() {
        assert_eq!(checksum(&[]), 0x811C_9DC5);
        assert_ne!(checksum(&[1, 2, 3]), checksum(&[1, 2, 4]));
    }
}
