//! Trait representing the bus a Z80/8080 core runs against.
//!
//! Every board implements this once per processor it owns. Accesses never
//! fail: unmapped reads return open-bus (0xFF) and unmapped writes vanish,
//! which is the implementor's job.

pub trait CpuBus {
    fn read_u8(&mut self, addr: u16) -> u8;
    fn write_u8(&mut self, addr: u16, value: u8);

    /// I/O space. Z80 cores present the full 16-bit address bus value
    /// (high byte is B or A depending on the instruction); 8080 cores
    /// present the 8-bit port zero-extended.
    fn read_port(&mut self, _port: u16) -> u8 {
        0xFF
    }
    fn write_port(&mut self, _port: u16, _value: u8) {}

    /// Called when an instruction moves IFF1 from clear to set. Returning
    /// `Some(data)` delivers a maskable interrupt with that data-bus value
    /// as soon as the instruction completes.
    fn interrupts_enabled(&mut self) -> Option<u8> {
        None
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read_u8(addr) as u16;
        let hi = self.read_u8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }
    fn write_u16(&mut self, addr: u16, value: u16) {
        self.write_u8(addr, (value & 0xFF) as u8);
        self.write_u8(addr.wrapping_add(1), (value >> 8) as u8);
    }
}
