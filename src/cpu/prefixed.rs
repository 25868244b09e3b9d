//! Z80 prefixed opcode pages: CB, ED, DD/FD and DDCB/FDCB.
//!
//! Prefix bytes sit in the unprefixed table with a cost of zero; the
//! handler fetches the next byte, runs the entry from the matching page and
//! adds that entry's cost.

use super::opcodes::{nop, z80_tables, Opcode, OpcodeTable};
use crate::cpu_bus::CpuBus;
use crate::cpu_core::{self as core, CoreState, IndexMode, CF, HF, NF, PF, SF, XF, YF, ZF};

fn run_entry(state: &mut CoreState, bus: &mut dyn CpuBus, entry: Opcode) {
    (entry.exec)(state, bus);
    state.add_extra(entry.cycles as u32);
}

pub(crate) fn prefix_cb(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let op = core::fetch_u8(state, bus);
    state.opcode = op;
    run_entry(state, bus, z80_tables().cb[op as usize]);
}

pub(crate) fn prefix_ed(state: &mut CoreState, bus: &mut dyn CpuBus) {
    // ED cancels a preceding DD/FD
    state.index = IndexMode::Hl;
    let op = core::fetch_u8(state, bus);
    state.opcode = op;
    run_entry(state, bus, z80_tables().ed[op as usize]);
}

/// A DD/FD directly followed by another DD/FD ends the step as a 4-cycle
/// no-op with PC on the next prefix, so chains never nest.
fn prefix_index(state: &mut CoreState, bus: &mut dyn CpuBus, mode: IndexMode) {
    if matches!(bus.read_u8(state.pc), 0xDD | 0xFD) {
        state.add_extra(4);
        return;
    }
    state.index = mode;
    let op = core::fetch_u8(state, bus);
    state.opcode = op;
    run_entry(state, bus, z80_tables().indexed[op as usize]);
}

pub(crate) fn prefix_dd(state: &mut CoreState, bus: &mut dyn CpuBus) {
    prefix_index(state, bus, IndexMode::Ix);
}

pub(crate) fn prefix_fd(state: &mut CoreState, bus: &mut dyn CpuBus) {
    prefix_index(state, bus, IndexMode::Iy);
}

/// DD CB d op: the displacement comes before the opcode byte.
fn prefix_indexed_cb(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let d = core::fetch_u8(state, bus) as i8;
    state.memptr = state.idx().wrapping_add(d as i16 as u16);
    let op = core::fetch_u8(state, bus);
    state.opcode = op;
    run_entry(state, bus, z80_tables().indexed_cb[op as usize]);
}

// ---------------------------------------------------------------------------
// Table construction
// ---------------------------------------------------------------------------

pub(crate) fn build_cb() -> OpcodeTable {
    let mut t = [Opcode::new(8, nop); 256];
    for op in 0..256usize {
        let mem = op & 7 == 6;
        t[op] = match op >> 6 {
            0 => Opcode::new(if mem { 15 } else { 8 }, cb_shift),
            1 => Opcode::new(if mem { 12 } else { 8 }, cb_bit),
            2 => Opcode::new(if mem { 15 } else { 8 }, cb_res),
            _ => Opcode::new(if mem { 15 } else { 8 }, cb_set),
        };
    }
    t
}

pub(crate) fn build_indexed_cb() -> OpcodeTable {
    let mut t = [Opcode::new(23, nop); 256];
    for op in 0..256usize {
        t[op] = match op >> 6 {
            0 => Opcode::new(23, indexed_cb_shift),
            1 => Opcode::new(20, indexed_cb_bit),
            2 => Opcode::new(23, indexed_cb_res),
            _ => Opcode::new(23, indexed_cb_set),
        };
    }
    t
}

fn uses_memory_operand(op: usize) -> bool {
    match op {
        0x34..=0x36 => true,
        0x76 => false,
        0x40..=0x7F => op & 7 == 6 || (op >> 3) & 7 == 6,
        0x80..=0xBF => op & 7 == 6,
        _ => false,
    }
}

/// DD/FD page derived from the unprefixed one: the same functions run with
/// `CoreState::index` selecting IX/IY. Register forms cost four more cycles;
/// (IX+d) forms pay for the displacement fetch and address add.
pub(crate) fn build_indexed(base: &OpcodeTable) -> OpcodeTable {
    let mut t = *base;
    for op in 0..256usize {
        let cycles = if op == 0x36 {
            19
        } else if uses_memory_operand(op) {
            base[op].cycles + 12
        } else {
            base[op].cycles + 4
        };
        t[op] = Opcode::new(cycles, base[op].exec);
    }
    t[0xCB] = Opcode::new(0, prefix_indexed_cb);
    // prefix_index stops before a second prefix is fetched
    t[0xDD] = Opcode::new(4, nop);
    t[0xFD] = Opcode::new(4, nop);
    t
}

pub(crate) fn build_ed() -> OpcodeTable {
    let mut t = [Opcode::new(8, nop); 256];
    for r in 0..8usize {
        let base = 0x40 | (r << 3);
        t[base] = Opcode::new(12, in_r_c);
        t[base | 1] = Opcode::new(12, out_c_r);
        t[base | 4] = Opcode::new(8, neg);
        t[base | 5] = Opcode::new(14, retn);
        t[base | 6] = Opcode::new(8, im);
    }
    for p in 0..4usize {
        let base = 0x40 | (p << 4);
        t[base | 0x02] = Opcode::new(15, sbc_hl_rp);
        t[base | 0x0A] = Opcode::new(15, adc_hl_rp);
        t[base | 0x03] = Opcode::new(20, ld_nn_rp);
        t[base | 0x0B] = Opcode::new(20, ld_rp_nn_ind);
    }
    t[0x47] = Opcode::new(9, ld_i_a);
    t[0x4F] = Opcode::new(9, ld_r_a);
    t[0x57] = Opcode::new(9, ld_a_i);
    t[0x5F] = Opcode::new(9, ld_a_r);
    t[0x67] = Opcode::new(18, rrd);
    t[0x6F] = Opcode::new(18, rld);
    for op in [0xA0, 0xA8, 0xB0, 0xB8] {
        t[op] = Opcode::new(16, block_ld);
        t[op | 1] = Opcode::new(16, block_cp);
        t[op | 2] = Opcode::new(16, block_in);
        t[op | 3] = Opcode::new(16, block_out);
    }
    t
}

// ---------------------------------------------------------------------------
// CB page
// ---------------------------------------------------------------------------

fn cb_read(state: &mut CoreState, bus: &mut dyn CpuBus, code: u8) -> u8 {
    if code == 6 {
        bus.read_u8(state.hl())
    } else {
        state.reg(code)
    }
}

fn cb_write(state: &mut CoreState, bus: &mut dyn CpuBus, code: u8, v: u8) {
    if code == 6 {
        bus.write_u8(state.hl(), v);
    } else {
        state.set_reg(code, v);
    }
}

fn cb_shift(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = state.opcode & 7;
    let op = state.opcode >> 3;
    let v = cb_read(state, bus, code);
    let res = core::shift_rotate(state, op, v);
    cb_write(state, bus, code, res);
}

fn cb_bit(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = state.opcode & 7;
    let b = (state.opcode >> 3) & 7;
    let v = cb_read(state, bus, code);
    let xy = if code == 6 { (state.hl() >> 8) as u8 } else { v };
    core::bit(state, b, v, xy);
}

fn cb_res(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = state.opcode & 7;
    let mask = !(1u8 << ((state.opcode >> 3) & 7));
    let v = cb_read(state, bus, code);
    cb_write(state, bus, code, v & mask);
}

fn cb_set(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = state.opcode & 7;
    let mask = 1u8 << ((state.opcode >> 3) & 7);
    let v = cb_read(state, bus, code);
    cb_write(state, bus, code, v | mask);
}

// ---------------------------------------------------------------------------
// DDCB/FDCB page. Results are also copied into the register named by the
// low three bits unless that field is 6 (undocumented but stable).
// ---------------------------------------------------------------------------

fn indexed_cb_store(state: &mut CoreState, bus: &mut dyn CpuBus, v: u8) {
    bus.write_u8(state.memptr, v);
    let code = state.opcode & 7;
    if code != 6 {
        state.set_reg_plain(code, v);
    }
}

fn indexed_cb_shift(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_u8(state.memptr);
    let op = state.opcode >> 3;
    let res = core::shift_rotate(state, op, v);
    indexed_cb_store(state, bus, res);
}

fn indexed_cb_bit(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_u8(state.memptr);
    let b = (state.opcode >> 3) & 7;
    let xy = (state.memptr >> 8) as u8;
    core::bit(state, b, v, xy);
}

fn indexed_cb_res(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_u8(state.memptr);
    let mask = !(1u8 << ((state.opcode >> 3) & 7));
    indexed_cb_store(state, bus, v & mask);
}

fn indexed_cb_set(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_u8(state.memptr);
    let mask = 1u8 << ((state.opcode >> 3) & 7);
    indexed_cb_store(state, bus, v | mask);
}

// ---------------------------------------------------------------------------
// ED page
// ---------------------------------------------------------------------------

fn in_r_c(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_port(state.bc());
    state.f = (state.f & CF) | core::sz53p(v);
    let code = (state.opcode >> 3) & 7;
    if code != 6 {
        state.set_reg(code, v);
    }
}

fn out_c_r(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = (state.opcode >> 3) & 7;
    let v = if code == 6 { 0 } else { state.reg(code) };
    bus.write_port(state.bc(), v);
}

fn neg(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let v = state.a;
    state.a = 0;
    core::sub8(state, v, false);
}

/// RETN and RETI both restore IFF1 from IFF2; this is what lets a return
/// from an NMI handler bring back the mask that was in force before it.
fn retn(state: &mut CoreState, bus: &mut dyn CpuBus) {
    state.iff1 = state.iff2;
    state.pc = core::pop_u16(state, bus);
}

fn im(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.im = match state.opcode & 0x18 {
        0x10 => 1,
        0x18 => 2,
        _ => 0,
    };
}

fn sbc_hl_rp(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let rhs = state.rp(state.opcode >> 4);
    core::sbc16(state, rhs);
}

fn adc_hl_rp(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let rhs = state.rp(state.opcode >> 4);
    core::adc16(state, rhs);
}

fn ld_nn_rp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    bus.write_u16(addr, state.rp(state.opcode >> 4));
}

fn ld_rp_nn_ind(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    let v = bus.read_u16(addr);
    state.set_rp(state.opcode >> 4, v);
}

fn ld_i_a(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.i = state.a;
}

fn ld_r_a(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.r = state.a;
}

fn ld_a_special(state: &mut CoreState, v: u8) {
    state.a = v;
    let mut f = (state.f & CF) | core::sz53(v);
    if state.iff2 {
        f |= PF;
    }
    state.f = f;
}

fn ld_a_i(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let v = state.i;
    ld_a_special(state, v);
}

fn ld_a_r(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let v = state.r;
    ld_a_special(state, v);
}

fn rrd(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = state.hl();
    let v = bus.read_u8(addr);
    bus.write_u8(addr, (state.a << 4) | (v >> 4));
    state.a = (state.a & 0xF0) | (v & 0x0F);
    state.f = (state.f & CF) | core::sz53p(state.a);
}

fn rld(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = state.hl();
    let v = bus.read_u8(addr);
    bus.write_u8(addr, (v << 4) | (state.a & 0x0F));
    state.a = (state.a & 0xF0) | (v >> 4);
    state.f = (state.f & CF) | core::sz53p(state.a);
}

/// Bit 3 of the opcode selects decrement, bit 4 selects repeat.
fn block_step(state: &CoreState) -> (u16, bool) {
    let step = if state.opcode & 0x08 != 0 { 0xFFFF } else { 1 };
    (step, state.opcode & 0x10 != 0)
}

fn repeat(state: &mut CoreState) {
    state.pc = state.pc.wrapping_sub(2);
    state.add_extra(5);
}

fn block_ld(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let (step, repeating) = block_step(state);
    let v = bus.read_u8(state.hl());
    bus.write_u8(state.de(), v);
    state.set_hl(state.hl().wrapping_add(step));
    state.set_de(state.de().wrapping_add(step));
    let bc = state.bc().wrapping_sub(1);
    state.set_bc(bc);

    let n = v.wrapping_add(state.a);
    let mut f = (state.f & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF);
    if bc != 0 {
        f |= PF;
    }
    state.f = f;
    if repeating && bc != 0 {
        repeat(state);
    }
}

fn block_cp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let (step, repeating) = block_step(state);
    let v = bus.read_u8(state.hl());
    let res = state.a.wrapping_sub(v);
    let half = (state.a ^ v ^ res) & HF;
    state.set_hl(state.hl().wrapping_add(step));
    let bc = state.bc().wrapping_sub(1);
    state.set_bc(bc);

    let n = res.wrapping_sub((half != 0) as u8);
    let mut f = (state.f & CF) | NF | (res & SF) | half | (n & XF) | ((n << 4) & YF);
    if res == 0 {
        f |= ZF;
    }
    if bc != 0 {
        f |= PF;
    }
    state.f = f;
    if repeating && bc != 0 && res != 0 {
        repeat(state);
    }
}

fn block_in(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let (step, repeating) = block_step(state);
    let v = bus.read_port(state.bc());
    bus.write_u8(state.hl(), v);
    state.set_hl(state.hl().wrapping_add(step));
    state.b = state.b.wrapping_sub(1);
    state.f = core::sz53(state.b) | if v & 0x80 != 0 { NF } else { 0 };
    if repeating && state.b != 0 {
        repeat(state);
    }
}

fn block_out(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let (step, repeating) = block_step(state);
    let v = bus.read_u8(state.hl());
    state.b = state.b.wrapping_sub(1);
    bus.write_port(state.bc(), v);
    state.set_hl(state.hl().wrapping_add(step));
    state.f = core::sz53(state.b) | if v & 0x80 != 0 { NF } else { 0 };
    if repeating && state.b != 0 {
        repeat(state);
    }
}
