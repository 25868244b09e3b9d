//! Shared Z80/8080 register file and instruction helpers.
//!
//! Both processor models run on the same `CoreState`; the opcode tables in
//! `crate::cpu::opcodes` and `crate::cpu::prefixed` are free functions over
//! this state and a `CpuBus`. Flag behaviour that differs between the two
//! families is decided here by looking at `CoreState::model`.

use crate::cpu_bus::CpuBus;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0x01;
        const SUBTRACT = 0x02;
        const PARITY_OVERFLOW = 0x04;
        const X = 0x08;
        const HALF_CARRY = 0x10;
        const Y = 0x20;
        const ZERO = 0x40;
        const SIGN = 0x80;
    }
}

pub(crate) const CF: u8 = StatusFlags::CARRY.bits();
pub(crate) const NF: u8 = StatusFlags::SUBTRACT.bits();
pub(crate) const PF: u8 = StatusFlags::PARITY_OVERFLOW.bits();
pub(crate) const XF: u8 = StatusFlags::X.bits();
pub(crate) const HF: u8 = StatusFlags::HALF_CARRY.bits();
pub(crate) const YF: u8 = StatusFlags::Y.bits();
pub(crate) const ZF: u8 = StatusFlags::ZERO.bits();
pub(crate) const SF: u8 = StatusFlags::SIGN.bits();

/// Stack pointer value loaded at reset.
pub const SP_SENTINEL: u16 = 0xF000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    Z80,
    I8080,
}

/// Which register stands in for HL while a DD/FD prefixed opcode runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Hl,
    Ix,
    Iy,
}

#[derive(Debug, Clone)]
pub struct CoreState {
    pub model: Model,
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,
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
    /// Lifetime cycle count.
    pub cycles: u64,
    /// Cycles added by the running instruction on top of its table cost
    /// (taken branches, repeated block ops, prefix chaining).
    pub extra_cycles: u32,
    /// Opcode byte currently executing; table functions decode their
    /// register fields from it.
    pub opcode: u8,
    pub index: IndexMode,
    /// Internal address latch (WZ). Holds the (IX+d) address across the
    /// DDCB/FDCB opcode fetch.
    pub memptr: u16,
}

impl CoreState {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            a: 0,
            f: if model == Model::I8080 { 0x02 } else { 0 },
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_alt: 0,
            f_alt: 0,
            b_alt: 0,
            c_alt: 0,
            d_alt: 0,
            e_alt: 0,
            h_alt: 0,
            l_alt: 0,
            ix: 0,
            iy: 0,
            sp: SP_SENTINEL,
            pc: 0,
            i: 0,
            r: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            cycles: 0,
            extra_cycles: 0,
            opcode: 0,
            index: IndexMode::Hl,
            memptr: 0,
        }
    }

    #[inline]
    pub fn is_8080(&self) -> bool {
        self.model == Model::I8080
    }

    pub fn flags(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.f)
    }

    #[inline]
    pub fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }
    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }
    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }
    pub fn set_bc(&mut self, v: u16) {
        [self.b, self.c] = v.to_be_bytes();
    }
    pub fn set_de(&mut self, v: u16) {
        [self.d, self.e] = v.to_be_bytes();
    }
    pub fn set_hl(&mut self, v: u16) {
        [self.h, self.l] = v.to_be_bytes();
    }
    pub fn set_af(&mut self, v: u16) {
        let [a, f] = v.to_be_bytes();
        self.a = a;
        self.f = if self.is_8080() { (f & 0xD7) | 0x02 } else { f };
    }

    /// HL, IX or IY depending on the active prefix.
    pub fn idx(&self) -> u16 {
        match self.index {
            IndexMode::Hl => self.hl(),
            IndexMode::Ix => self.ix,
            IndexMode::Iy => self.iy,
        }
    }
    pub fn set_idx(&mut self, v: u16) {
        match self.index {
            IndexMode::Hl => self.set_hl(v),
            IndexMode::Ix => self.ix = v,
            IndexMode::Iy => self.iy = v,
        }
    }

    /// 16-bit register pair by its 2-bit opcode field (BC, DE, HL/IX/IY, SP).
    pub fn rp(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.bc(),
            1 => self.de(),
            2 => self.idx(),
            _ => self.sp,
        }
    }
    pub fn set_rp(&mut self, code: u8, v: u16) {
        match code & 3 {
            0 => self.set_bc(v),
            1 => self.set_de(v),
            2 => self.set_idx(v),
            _ => self.sp = v,
        }
    }

    /// PUSH/POP pair encoding: AF takes SP's slot.
    pub fn rp2(&self, code: u8) -> u16 {
        if code & 3 == 3 {
            self.af()
        } else {
            self.rp(code)
        }
    }
    pub fn set_rp2(&mut self, code: u8, v: u16) {
        if code & 3 == 3 {
            self.set_af(v)
        } else {
            self.set_rp(code, v)
        }
    }

    /// 8-bit register by its 3-bit opcode field. Code 6 ((HL)) is handled by
    /// the callers because it needs the bus. Under a DD/FD prefix codes 4/5
    /// address the index register halves.
    pub fn reg(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => (self.idx() >> 8) as u8,
            5 => self.idx() as u8,
            7 => self.a,
            _ => 0xFF,
        }
    }
    pub fn set_reg(&mut self, code: u8, v: u8) {
        match code & 7 {
            0 => self.b = v,
            1 => self.c = v,
            2 => self.d = v,
            3 => self.e = v,
            4 => {
                let w = self.idx();
                self.set_idx((w & 0x00FF) | ((v as u16) << 8));
            }
            5 => {
                let w = self.idx();
                self.set_idx((w & 0xFF00) | v as u16);
            }
            7 => self.a = v,
            _ => {}
        }
    }

    /// Register access that ignores the index prefix (used for the
    /// non-H/L operand of `LD r,(IX+d)` style instructions).
    pub fn reg_plain(&self, code: u8) -> u8 {
        match code & 7 {
            4 => self.h,
            5 => self.l,
            other => self.reg(other),
        }
    }
    pub fn set_reg_plain(&mut self, code: u8, v: u8) {
        match code & 7 {
            4 => self.h = v,
            5 => self.l = v,
            other => self.set_reg(other, v),
        }
    }

    pub fn condition(&self, code: u8) -> bool {
        match code & 7 {
            0 => !self.flag(ZF),
            1 => self.flag(ZF),
            2 => !self.flag(CF),
            3 => self.flag(CF),
            4 => !self.flag(PF),
            5 => self.flag(PF),
            6 => !self.flag(SF),
            _ => self.flag(SF),
        }
    }

    pub fn exchange_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_alt);
        std::mem::swap(&mut self.f, &mut self.f_alt);
    }

    pub fn exchange_shadow(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_alt);
        std::mem::swap(&mut self.c, &mut self.c_alt);
        std::mem::swap(&mut self.d, &mut self.d_alt);
        std::mem::swap(&mut self.e, &mut self.e_alt);
        std::mem::swap(&mut self.h, &mut self.h_alt);
        std::mem::swap(&mut self.l, &mut self.l_alt);
    }

    /// R advances in its low 7 bits; bit 7 only changes through LD R,A.
    #[inline]
    pub fn bump_refresh(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    #[inline]
    pub fn add_extra(&mut self, cycles: u32) {
        self.extra_cycles += cycles;
    }
}

// ---------------------------------------------------------------------------
// Bus helpers
// ---------------------------------------------------------------------------

pub fn fetch_u8(state: &mut CoreState, bus: &mut dyn CpuBus) -> u8 {
    let value = bus.read_u8(state.pc);
    state.pc = state.pc.wrapping_add(1);
    value
}

pub fn fetch_u16(state: &mut CoreState, bus: &mut dyn CpuBus) -> u16 {
    let lo = fetch_u8(state, bus) as u16;
    let hi = fetch_u8(state, bus) as u16;
    (hi << 8) | lo
}

pub fn push_u16(state: &mut CoreState, bus: &mut dyn CpuBus, value: u16) {
    state.sp = state.sp.wrapping_sub(1);
    bus.write_u8(state.sp, (value >> 8) as u8);
    state.sp = state.sp.wrapping_sub(1);
    bus.write_u8(state.sp, value as u8);
}

pub fn pop_u16(state: &mut CoreState, bus: &mut dyn CpuBus) -> u16 {
    let lo = bus.read_u8(state.sp) as u16;
    state.sp = state.sp.wrapping_add(1);
    let hi = bus.read_u8(state.sp) as u16;
    state.sp = state.sp.wrapping_add(1);
    (hi << 8) | lo
}

pub fn call(state: &mut CoreState, bus: &mut dyn CpuBus, target: u16) {
    let ret = state.pc;
    push_u16(state, bus, ret);
    state.pc = target;
}

/// Effective address of the memory operand: (HL) or (IX+d)/(IY+d). The
/// displacement byte is fetched here, so call it exactly once per opcode.
pub fn operand_addr(state: &mut CoreState, bus: &mut dyn CpuBus) -> u16 {
    match state.index {
        IndexMode::Hl => state.hl(),
        _ => {
            let d = fetch_u8(state, bus) as i8;
            state.idx().wrapping_add(d as i16 as u16)
        }
    }
}

// ---------------------------------------------------------------------------
// ALU
// ---------------------------------------------------------------------------

#[inline]
pub fn parity(v: u8) -> u8 {
    if v.count_ones() % 2 == 0 {
        PF
    } else {
        0
    }
}

#[inline]
pub fn sz53(v: u8) -> u8 {
    let mut f = v & (SF | YF | XF);
    if v == 0 {
        f |= ZF;
    }
    f
}

#[inline]
pub fn sz53p(v: u8) -> u8 {
    sz53(v) | parity(v)
}

/// 8080 flag byte layout: S Z 0 AC 0 P 1 C.
#[inline]
fn i8080_flags(f: u8, result: u8) -> u8 {
    (f & (SF | ZF | HF | CF)) | parity(result) | 0x02
}

pub fn add8(state: &mut CoreState, v: u8, carry_in: bool) {
    let a = state.a;
    let sum = a as u16 + v as u16 + carry_in as u16;
    let res = sum as u8;
    let mut f = sz53(res) | ((a ^ v ^ res) & HF);
    if sum > 0xFF {
        f |= CF;
    }
    if (a ^ v) & 0x80 == 0 && (a ^ res) & 0x80 != 0 {
        f |= PF;
    }
    state.a = res;
    state.f = if state.is_8080() { i8080_flags(f, res) } else { f };
}

fn sub8_result(state: &mut CoreState, v: u8, carry_in: bool) -> u8 {
    let a = state.a;
    let c = carry_in as u16;
    let res = (a as u16).wrapping_sub(v as u16).wrapping_sub(c) as u8;
    if state.is_8080() {
        // The 8080 subtracts by adding the complement; AC is that adder's
        // nibble carry and CY is the inverted final carry.
        let nv = !v;
        let sum = a as u16 + nv as u16 + (1 - c);
        let mut f = sz53(res) | ((a ^ nv ^ res) & HF);
        if sum <= 0xFF {
            f |= CF;
        }
        state.f = i8080_flags(f, res);
    } else {
        let mut f = sz53(res) | NF | ((a ^ v ^ res) & HF);
        if (a as u16) < v as u16 + c {
            f |= CF;
        }
        if (a ^ v) & 0x80 != 0 && (a ^ res) & 0x80 != 0 {
            f |= PF;
        }
        state.f = f;
    }
    res
}

pub fn sub8(state: &mut CoreState, v: u8, carry_in: bool) {
    state.a = sub8_result(state, v, carry_in);
}

pub fn cp8(state: &mut CoreState, v: u8) {
    sub8_result(state, v, false);
    if !state.is_8080() {
        state.f = (state.f & !(YF | XF)) | (v & (YF | XF));
    }
}

pub fn and8(state: &mut CoreState, v: u8) {
    let a = state.a;
    let res = a & v;
    state.a = res;
    state.f = if state.is_8080() {
        let ac = if (a | v) & 0x08 != 0 { HF } else { 0 };
        i8080_flags(sz53(res) | ac, res)
    } else {
        sz53p(res) | HF
    };
}

pub fn xor8(state: &mut CoreState, v: u8) {
    let res = state.a ^ v;
    state.a = res;
    state.f = if state.is_8080() {
        i8080_flags(sz53(res), res)
    } else {
        sz53p(res)
    };
}

pub fn or8(state: &mut CoreState, v: u8) {
    let res = state.a | v;
    state.a = res;
    state.f = if state.is_8080() {
        i8080_flags(sz53(res), res)
    } else {
        sz53p(res)
    };
}

/// ALU operation selected by bits 3-5 of the opcode (ADD ADC SUB SBC AND XOR OR CP).
pub fn alu(state: &mut CoreState, op: u8, v: u8) {
    let carry = state.flag(CF);
    match op & 7 {
        0 => add8(state, v, false),
        1 => add8(state, v, carry),
        2 => sub8(state, v, false),
        3 => sub8(state, v, carry),
        4 => and8(state, v),
        5 => xor8(state, v),
        6 => or8(state, v),
        _ => cp8(state, v),
    }
}

pub fn inc8(state: &mut CoreState, v: u8) -> u8 {
    let res = v.wrapping_add(1);
    if state.is_8080() {
        let ac = if res & 0x0F == 0 { HF } else { 0 };
        state.f = i8080_flags((state.f & CF) | sz53(res) | ac, res);
    } else {
        let mut f = (state.f & CF) | sz53(res);
        if res & 0x0F == 0 {
            f |= HF;
        }
        if res == 0x80 {
            f |= PF;
        }
        state.f = f;
    }
    res
}

pub fn dec8(state: &mut CoreState, v: u8) -> u8 {
    let res = v.wrapping_sub(1);
    if state.is_8080() {
        let ac = if res & 0x0F != 0x0F { HF } else { 0 };
        state.f = i8080_flags((state.f & CF) | sz53(res) | ac, res);
    } else {
        let mut f = (state.f & CF) | sz53(res) | NF;
        if v & 0x0F == 0 {
            f |= HF;
        }
        if res == 0x7F {
            f |= PF;
        }
        state.f = f;
    }
    res
}

/// ADD HL,rr / DAD (also ADD IX,rr under a prefix).
pub fn add16(state: &mut CoreState, lhs: u16, rhs: u16) -> u16 {
    let sum = lhs as u32 + rhs as u32;
    let res = sum as u16;
    let carry = if sum > 0xFFFF { CF } else { 0 };
    if state.is_8080() {
        state.f = (state.f & !CF) | carry;
    } else {
        state.f = (state.f & (SF | ZF | PF))
            | ((res >> 8) as u8 & (YF | XF))
            | (((lhs ^ rhs ^ res) >> 8) as u8 & HF)
            | carry;
    }
    res
}

pub fn adc16(state: &mut CoreState, rhs: u16) {
    let lhs = state.hl();
    let c = state.flag(CF) as u32;
    let sum = lhs as u32 + rhs as u32 + c;
    let res = sum as u16;
    let hi = (res >> 8) as u8;
    let mut f = (hi & (SF | YF | XF)) | (((lhs ^ rhs ^ res) >> 8) as u8 & HF);
    if res == 0 {
        f |= ZF;
    }
    if sum > 0xFFFF {
        f |= CF;
    }
    if (lhs ^ rhs) & 0x8000 == 0 && (lhs ^ res) & 0x8000 != 0 {
        f |= PF;
    }
    state.f = f;
    state.set_hl(res);
}

pub fn sbc16(state: &mut CoreState, rhs: u16) {
    let lhs = state.hl();
    let c = state.flag(CF) as u32;
    let res = (lhs as u32).wrapping_sub(rhs as u32).wrapping_sub(c) as u16;
    let hi = (res >> 8) as u8;
    let mut f = NF | (hi & (SF | YF | XF)) | (((lhs ^ rhs ^ res) >> 8) as u8 & HF);
    if res == 0 {
        f |= ZF;
    }
    if (lhs as u32) < rhs as u32 + c {
        f |= CF;
    }
    if (lhs ^ rhs) & 0x8000 != 0 && (lhs ^ res) & 0x8000 != 0 {
        f |= PF;
    }
    state.f = f;
    state.set_hl(res);
}

pub fn daa(state: &mut CoreState) {
    let a = state.a;
    let subtract = !state.is_8080() && state.flag(NF);
    let mut correction = 0u8;
    let mut carry = state.flag(CF);
    if state.flag(HF) || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }
    let res = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    let half = if subtract {
        state.flag(HF) && a & 0x0F < 6
    } else {
        a & 0x0F > 9
    };
    let mut f = sz53p(res) | (state.f & NF);
    if half {
        f |= HF;
    }
    if carry {
        f |= CF;
    }
    state.a = res;
    state.f = if state.is_8080() { i8080_flags(f, res) } else { f };
}

/// Accumulator rotates (RLCA RRCA RLA RRA); only C and, on the Z80,
/// H/N/X/Y change.
pub fn rotate_a(state: &mut CoreState, op: u8) {
    let a = state.a;
    let cin = state.flag(CF) as u8;
    let (res, cout) = match op & 3 {
        0 => (a.rotate_left(1), a >> 7),
        1 => (a.rotate_right(1), a & 1),
        2 => ((a << 1) | cin, a >> 7),
        _ => ((a >> 1) | (cin << 7), a & 1),
    };
    state.a = res;
    state.f = if state.is_8080() {
        (state.f & !CF) | cout
    } else {
        (state.f & (SF | ZF | PF)) | (res & (YF | XF)) | cout
    };
}

/// CB-prefix shift/rotate selected by bits 3-5 (RLC RRC RL RR SLA SRA SLL SRL).
pub fn shift_rotate(state: &mut CoreState, op: u8, v: u8) -> u8 {
    let cin = state.flag(CF) as u8;
    let (res, cout) = match op & 7 {
        0 => (v.rotate_left(1), v >> 7),
        1 => (v.rotate_right(1), v & 1),
        2 => ((v << 1) | cin, v >> 7),
        3 => ((v >> 1) | (cin << 7), v & 1),
        4 => (v << 1, v >> 7),
        5 => ((v >> 1) | (v & 0x80), v & 1),
        6 => ((v << 1) | 1, v >> 7),
        _ => (v >> 1, v & 1),
    };
    state.f = sz53p(res) | cout;
    res
}

/// BIT b,v. `xy_source` supplies the undocumented X/Y bits (the operand for
/// registers, the high byte of the effective address for memory forms).
pub fn bit(state: &mut CoreState, b: u8, v: u8, xy_source: u8) {
    let set = v & (1 << (b & 7)) != 0;
    let mut f = (state.f & CF) | HF | (xy_source & (YF | XF));
    if !set {
        f |= ZF | PF;
    }
    if set && b & 7 == 7 {
        f |= SF;
    }
    state.f = f;
}
