// Small board chips shared by the arcade boards.

use serde::{Deserialize, Serialize};

/// One-byte mailbox from the main CPU to the sound CPU.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundLatch {
    value: u8,
    pending: bool,
}

impl SoundLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, value: u8) {
        self.value = value;
        self.pending = true;
    }

    /// Reading acknowledges the command.
    pub fn read(&mut self) -> u8 {
        self.pending = false;
        self.value
    }

    pub fn peek(&self) -> u8 {
        self.value
    }

    pub fn pending(&self) -> bool {
        self.pending
    }
}

/// Discrete barrel shifter found next to 8080 boards: each data write pushes
/// a byte into the high half of a 16-bit word, the offset selects which
/// 8-bit window a read returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftRegister {
    word: u16,
    offset: u8,
}

impl ShiftRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_data(&mut self, value: u8) {
        self.word = ((value as u16) << 8) | (self.word >> 8);
    }

    pub fn set_offset(&mut self, value: u8) {
        self.offset = value & 0x07;
    }

    pub fn read(&self) -> u8 {
        (self.word >> (8 - self.offset)) as u8
    }
}

/// Frame-counting watchdog. The program must kick it before `limit` frames
/// elapse or the board resets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watchdog {
    counter: u32,
    limit: u32,
}

impl Watchdog {
    pub fn new(limit: u32) -> Self {
        Self { counter: 0, limit }
    }

    pub fn kick(&mut self) {
        self.counter = 0;
    }

    /// Advances one frame; true when the watchdog fires (counter restarts).
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.limit {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    pub fn frames_since_kick(&self) -> u32 {
        self.counter
    }
}

/// Eight independently addressable output bits (74LS259 style): a write to
/// offset n sets bit n from bit 0 of the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLatch {
    bits: u8,
}

impl OutputLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        let mask = 1u8 << (offset & 7);
        if value & 1 != 0 {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    pub fn bit(&self, n: u8) -> bool {
        self.bits & (1 << (n & 7)) != 0
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }
}

/// Register file of an AY-style sound chip: one write selects a register,
/// the data port reads or writes it. Waveform synthesis lives elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundChipRegisters {
    selected: u8,
    regs: [u8; 16],
}

impl SoundChipRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, value: u8) {
        self.selected = value & 0x0F;
    }

    pub fn write_data(&mut self, value: u8) {
        self.regs[self.selected as usize] = value;
    }

    pub fn read_data(&self) -> u8 {
        self.regs[self.selected as usize]
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_latch_read_acknowledges() {
        let mut latch = SoundLatch::new();
        assert!(!latch.pending());
        latch.write(0x21);
        assert!(latch.pending());
        assert_eq!(latch.read(), 0x21);
        assert!(!latch.pending());
        assert_eq!(latch.peek(), 0x21);
    }

    #[test]
    fn test_shift_register_windows() {
        let mut shift = ShiftRegister::new();
        shift.write_data(0xAB);
        shift.write_data(0xCD);
        // word = 0xCDAB
        shift.set_offset(0);
        assert_eq!(shift.read(), 0xCD);
        shift.set_offset(4);
        assert_eq!(shift.read(), 0xDA);
        shift.set_offset(0xFF);
        assert_eq!(shift.read(), 0xD5);
    }

    #[test]
    fn test_watchdog_fires_after_limit() {
        let mut dog = Watchdog::new(3);
        assert!(!dog.tick());
        assert!(!dog.tick());
        dog.kick();
        assert!(!dog.tick());
        assert!(!dog.tick());
        assert!(dog.tick());
        assert_eq!(dog.frames_since_kick(), 0);
    }

    #[test]
    fn test_output_latch_bits() {
        let mut latch = OutputLatch::new();
        latch.write(1, 1);
        latch.write(3, 0xFF);
        assert_eq!(latch.bits(), 0x0A);
        latch.write(1, 0xFE);
        assert!(!latch.bit(1));
        assert!(latch.bit(3));
    }

    #[test]
    fn test_sound_chip_register_select() {
        let mut chip = SoundChipRegisters::new();
        chip.select(0x17);
        chip.write_data(0x3E);
        assert_eq!(chip.registers()[7], 0x3E);
        chip.select(2);
        assert_eq!(chip.read_data(), 0);
        chip.select(7);
        assert_eq!(chip.read_data(), 0x3E);
    }
}
