use crate::cpu::Cpu;

/// Board-agnostic entry points used by the headless runner and tests.
///
/// Each board owns its processors, memory map, peripherals and frame
/// scheduler; callers only drive whole frames and read state back.
pub trait Machine {
    /// Short identifier, also stored in save states.
    fn name(&self) -> &'static str;

    /// Advances emulation by one video frame.
    fn run_frame(&mut self);

    /// Power-on reset: processors, RAM, peripherals and scheduler carries.
    /// ROM contents are kept.
    fn reset(&mut self);

    /// Copies ROM images into the board's ROM regions in board order. Call
    /// before the first frame (or follow with `reset`).
    fn load_roms(&mut self, images: &[Vec<u8>]) -> Result<(), String>;

    /// Sets an input bit; `pressed` is translated to the board's polarity.
    fn set_input(&mut self, port: usize, bit: u8, pressed: bool);

    fn cpus(&self) -> Vec<&Cpu>;

    fn frame_count(&self) -> u64;

    fn save_state(&self) -> Result<Vec<u8>, String>;

    fn load_state(&mut self, data: &[u8]) -> Result<(), String>;
}

pub fn set_bit(byte: &mut u8, bit: u8, on: bool) {
    if on {
        *byte |= 1 << bit;
    } else {
        *byte &= !(1 << bit);
    }
}
