//! Unprefixed opcode tables for the 8080 and Z80 models.
//!
//! Each entry pairs the instruction's base cycle cost with the function that
//! carries out its effect. Functions decode register fields from
//! `CoreState::opcode`, so one function serves a whole opcode column. Costs
//! that depend on the outcome (taken branches, repeats) are added by the
//! function through `CoreState::add_extra`.

use std::sync::OnceLock;

use super::prefixed;
use crate::cpu_bus::CpuBus;
use crate::cpu_core::{self as core, CoreState, Model, CF, HF, NF, PF, SF, XF, YF, ZF};

pub type ExecFn = fn(&mut CoreState, &mut dyn CpuBus);

#[derive(Clone, Copy)]
pub struct Opcode {
    pub cycles: u8,
    pub exec: ExecFn,
}

impl Opcode {
    pub const fn new(cycles: u8, exec: ExecFn) -> Self {
        Self { cycles, exec }
    }
}

impl std::fmt::Debug for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opcode").field("cycles", &self.cycles).finish()
    }
}

pub type OpcodeTable = [Opcode; 256];

/// Z80 table set: unprefixed, CB, ED, DD/FD (shared, the prefix picks IX or
/// IY), and DDCB/FDCB.
pub struct Z80Tables {
    pub base: OpcodeTable,
    pub cb: OpcodeTable,
    pub ed: OpcodeTable,
    pub indexed: OpcodeTable,
    pub indexed_cb: OpcodeTable,
}

pub fn base_table(model: Model) -> &'static OpcodeTable {
    match model {
        Model::Z80 => &z80_tables().base,
        Model::I8080 => i8080_table(),
    }
}

pub fn i8080_table() -> &'static OpcodeTable {
    static TABLE: OnceLock<OpcodeTable> = OnceLock::new();
    TABLE.get_or_init(build_i8080)
}

pub fn z80_tables() -> &'static Z80Tables {
    static TABLES: OnceLock<Z80Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let base = build_z80_base();
        let indexed = prefixed::build_indexed(&base);
        Z80Tables {
            base,
            cb: prefixed::build_cb(),
            ed: prefixed::build_ed(),
            indexed,
            indexed_cb: prefixed::build_indexed_cb(),
        }
    })
}

// ---------------------------------------------------------------------------
// Table construction
// ---------------------------------------------------------------------------

/// Entries shared by both models; model-specific costs passed in.
struct Costs {
    inc_rp: u8,
    add_hl: u8,
    inc_r: u8,
    inc_m: u8,
    ld_r_r: u8,
    halt: u8,
    call_cc: u8,
    io: u8,
    ex_sp_hl: u8,
    jp_hl: u8,
    ld_sp_hl: u8,
}

fn build_common(costs: &Costs) -> OpcodeTable {
    let mut t = [Opcode::new(4, nop); 256];

    for p in 0..4u8 {
        let base = (p << 4) as usize;
        t[base | 0x01] = Opcode::new(10, ld_rp_nn);
        t[base | 0x03] = Opcode::new(costs.inc_rp, inc_rp);
        t[base | 0x09] = Opcode::new(costs.add_hl, add_hl_rp);
        t[base | 0x0B] = Opcode::new(costs.inc_rp, dec_rp);
        t[0xC1 | base] = Opcode::new(10, pop_rp);
        t[0xC5 | base] = Opcode::new(11, push_rp);
    }
    t[0x02] = Opcode::new(7, ld_ind_rp_a);
    t[0x12] = Opcode::new(7, ld_ind_rp_a);
    t[0x0A] = Opcode::new(7, ld_a_ind_rp);
    t[0x1A] = Opcode::new(7, ld_a_ind_rp);
    t[0x22] = Opcode::new(16, ld_nn_hl);
    t[0x2A] = Opcode::new(16, ld_hl_nn);
    t[0x32] = Opcode::new(13, ld_nn_a);
    t[0x3A] = Opcode::new(13, ld_a_nn);

    for r in 0..8u8 {
        let base = (r << 3) as usize;
        let mem = r == 6;
        t[base | 0x04] = Opcode::new(if mem { costs.inc_m } else { costs.inc_r }, inc_r);
        t[base | 0x05] = Opcode::new(if mem { costs.inc_m } else { costs.inc_r }, dec_r);
        t[base | 0x06] = Opcode::new(if mem { 10 } else { 7 }, ld_r_n);
    }
    for op in [0x07, 0x0F, 0x17, 0x1F] {
        t[op] = Opcode::new(4, rotate_acc);
    }
    t[0x27] = Opcode::new(4, daa);
    t[0x2F] = Opcode::new(4, cpl);
    t[0x37] = Opcode::new(4, scf);
    t[0x3F] = Opcode::new(4, ccf);

    for op in 0x40..0x80usize {
        let mem = op & 7 == 6 || (op >> 3) & 7 == 6;
        t[op] = Opcode::new(if mem { 7 } else { costs.ld_r_r }, ld_r_r);
    }
    t[0x76] = Opcode::new(costs.halt, halt);

    for op in 0x80..0xC0usize {
        t[op] = Opcode::new(if op & 7 == 6 { 7 } else { 4 }, alu_r);
    }

    for cc in 0..8u8 {
        let base = 0xC0 | ((cc << 3) as usize);
        t[base] = Opcode::new(5, ret_cc);
        t[base | 2] = Opcode::new(10, jp_cc);
        t[base | 4] = Opcode::new(costs.call_cc, call_cc);
        t[base | 6] = Opcode::new(7, alu_n);
        t[base | 7] = Opcode::new(11, rst);
    }
    t[0xC3] = Opcode::new(10, jp);
    t[0xC9] = Opcode::new(10, ret);
    t[0xCD] = Opcode::new(17, call_nn);
    t[0xD3] = Opcode::new(costs.io, out_n_a);
    t[0xDB] = Opcode::new(costs.io, in_a_n);
    t[0xE3] = Opcode::new(costs.ex_sp_hl, ex_sp_hl);
    t[0xE9] = Opcode::new(costs.jp_hl, jp_hl);
    t[0xEB] = Opcode::new(4, ex_de_hl);
    t[0xF3] = Opcode::new(4, di);
    t[0xF9] = Opcode::new(costs.ld_sp_hl, ld_sp_hl);
    t[0xFB] = Opcode::new(4, ei);
    t
}

fn build_i8080() -> OpcodeTable {
    let mut t = build_common(&Costs {
        inc_rp: 5,
        add_hl: 10,
        inc_r: 5,
        inc_m: 10,
        ld_r_r: 5,
        halt: 7,
        call_cc: 11,
        io: 10,
        ex_sp_hl: 18,
        jp_hl: 5,
        ld_sp_hl: 5,
    });
    // Undocumented aliases: 08/10/18/.../38 stay NOP, the rest mirror
    // documented instructions.
    t[0xCB] = Opcode::new(10, jp);
    t[0xD9] = Opcode::new(10, ret);
    for op in [0xDD, 0xED, 0xFD] {
        t[op] = Opcode::new(17, call_nn);
    }
    t
}

fn build_z80_base() -> OpcodeTable {
    let mut t = build_common(&Costs {
        inc_rp: 6,
        add_hl: 11,
        inc_r: 4,
        inc_m: 11,
        ld_r_r: 4,
        halt: 4,
        call_cc: 10,
        io: 11,
        ex_sp_hl: 19,
        jp_hl: 4,
        ld_sp_hl: 6,
    });
    t[0x08] = Opcode::new(4, ex_af);
    t[0x10] = Opcode::new(8, djnz);
    t[0x18] = Opcode::new(12, jr);
    for op in [0x20, 0x28, 0x30, 0x38] {
        t[op] = Opcode::new(7, jr_cc);
    }
    t[0xD9] = Opcode::new(4, exx);
    t[0xCB] = Opcode::new(0, prefixed::prefix_cb);
    t[0xDD] = Opcode::new(0, prefixed::prefix_dd);
    t[0xED] = Opcode::new(0, prefixed::prefix_ed);
    t[0xFD] = Opcode::new(0, prefixed::prefix_fd);
    t
}

// ---------------------------------------------------------------------------
// Operand helpers
// ---------------------------------------------------------------------------

/// Reads register operand `code`, going to memory for code 6.
fn read_operand(state: &mut CoreState, bus: &mut dyn CpuBus, code: u8) -> u8 {
    if code & 7 == 6 {
        let addr = core::operand_addr(state, bus);
        bus.read_u8(addr)
    } else {
        state.reg(code)
    }
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

pub(crate) fn nop(_state: &mut CoreState, _bus: &mut dyn CpuBus) {}

fn ld_rp_nn(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = core::fetch_u16(state, bus);
    state.set_rp(state.opcode >> 4, v);
}

fn inc_rp(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let code = state.opcode >> 4;
    let v = state.rp(code).wrapping_add(1);
    state.set_rp(code, v);
}

fn dec_rp(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let code = state.opcode >> 4;
    let v = state.rp(code).wrapping_sub(1);
    state.set_rp(code, v);
}

fn add_hl_rp(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let lhs = state.idx();
    let rhs = state.rp(state.opcode >> 4);
    let res = core::add16(state, lhs, rhs);
    state.set_idx(res);
}

fn ld_ind_rp_a(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = if state.opcode == 0x02 { state.bc() } else { state.de() };
    bus.write_u8(addr, state.a);
}

fn ld_a_ind_rp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = if state.opcode == 0x0A { state.bc() } else { state.de() };
    state.a = bus.read_u8(addr);
}

fn ld_nn_hl(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    bus.write_u16(addr, state.idx());
}

fn ld_hl_nn(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    let v = bus.read_u16(addr);
    state.set_idx(v);
}

fn ld_nn_a(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    bus.write_u8(addr, state.a);
}

fn ld_a_nn(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let addr = core::fetch_u16(state, bus);
    state.a = bus.read_u8(addr);
}

fn inc_r(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = (state.opcode >> 3) & 7;
    if code == 6 {
        let addr = core::operand_addr(state, bus);
        let v = bus.read_u8(addr);
        let res = core::inc8(state, v);
        bus.write_u8(addr, res);
    } else {
        let v = state.reg(code);
        let res = core::inc8(state, v);
        state.set_reg(code, res);
    }
}

fn dec_r(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = (state.opcode >> 3) & 7;
    if code == 6 {
        let addr = core::operand_addr(state, bus);
        let v = bus.read_u8(addr);
        let res = core::dec8(state, v);
        bus.write_u8(addr, res);
    } else {
        let v = state.reg(code);
        let res = core::dec8(state, v);
        state.set_reg(code, res);
    }
}

fn ld_r_n(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let code = (state.opcode >> 3) & 7;
    if code == 6 {
        // displacement precedes the immediate
        let addr = core::operand_addr(state, bus);
        let n = core::fetch_u8(state, bus);
        bus.write_u8(addr, n);
    } else {
        let n = core::fetch_u8(state, bus);
        state.set_reg(code, n);
    }
}

fn rotate_acc(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let op = state.opcode >> 3;
    core::rotate_a(state, op);
}

fn daa(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    core::daa(state);
}

fn cpl(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.a = !state.a;
    if !state.is_8080() {
        state.f = (state.f & (SF | ZF | PF | CF)) | HF | NF | (state.a & (YF | XF));
    }
}

fn scf(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    if state.is_8080() {
        state.f |= CF;
    } else {
        state.f = (state.f & (SF | ZF | PF)) | CF | (state.a & (YF | XF));
    }
}

fn ccf(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let carry = state.flag(CF);
    if state.is_8080() {
        state.f ^= CF;
    } else {
        let mut f = (state.f & (SF | ZF | PF)) | (state.a & (YF | XF));
        if carry {
            f |= HF;
        } else {
            f |= CF;
        }
        state.f = f;
    }
}

fn ld_r_r(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let dst = (state.opcode >> 3) & 7;
    let src = state.opcode & 7;
    if src == 6 {
        let addr = core::operand_addr(state, bus);
        let v = bus.read_u8(addr);
        state.set_reg_plain(dst, v);
    } else if dst == 6 {
        let addr = core::operand_addr(state, bus);
        bus.write_u8(addr, state.reg_plain(src));
    } else {
        let v = state.reg(src);
        state.set_reg(dst, v);
    }
}

fn halt(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.halted = true;
}

fn alu_r(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let (src, op) = (state.opcode & 7, state.opcode >> 3);
    let v = read_operand(state, bus, src);
    core::alu(state, op, v);
}

fn alu_n(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let op = state.opcode >> 3;
    let v = core::fetch_u8(state, bus);
    core::alu(state, op, v);
}

fn ret_cc(state: &mut CoreState, bus: &mut dyn CpuBus) {
    if state.condition(state.opcode >> 3) {
        state.pc = core::pop_u16(state, bus);
        state.add_extra(6);
    }
}

fn ret(state: &mut CoreState, bus: &mut dyn CpuBus) {
    state.pc = core::pop_u16(state, bus);
}

fn pop_rp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = core::pop_u16(state, bus);
    state.set_rp2(state.opcode >> 4, v);
}

fn push_rp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = state.rp2(state.opcode >> 4);
    core::push_u16(state, bus, v);
}

fn jp_cc(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let target = core::fetch_u16(state, bus);
    if state.condition(state.opcode >> 3) {
        state.pc = target;
    }
}

fn jp(state: &mut CoreState, bus: &mut dyn CpuBus) {
    state.pc = core::fetch_u16(state, bus);
}

fn call_cc(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let target = core::fetch_u16(state, bus);
    if state.condition(state.opcode >> 3) {
        core::call(state, bus, target);
        state.add_extra(if state.is_8080() { 6 } else { 7 });
    }
}

fn call_nn(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let target = core::fetch_u16(state, bus);
    core::call(state, bus, target);
}

pub(crate) fn rst(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let target = (state.opcode & 0x38) as u16;
    core::call(state, bus, target);
}

/// Port number as driven on the address bus for `IN A,(n)` / `OUT (n),A`.
fn immediate_port(state: &CoreState, n: u8) -> u16 {
    if state.is_8080() {
        n as u16
    } else {
        ((state.a as u16) << 8) | n as u16
    }
}

fn out_n_a(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let n = core::fetch_u8(state, bus);
    let port = immediate_port(state, n);
    bus.write_port(port, state.a);
}

fn in_a_n(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let n = core::fetch_u8(state, bus);
    let port = immediate_port(state, n);
    state.a = bus.read_port(port);
}

fn ex_sp_hl(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let v = bus.read_u16(state.sp);
    bus.write_u16(state.sp, state.idx());
    state.set_idx(v);
}

fn jp_hl(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.pc = state.idx();
}

fn ex_de_hl(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    let de = state.de();
    let hl = state.hl();
    state.set_de(hl);
    state.set_hl(de);
}

fn di(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.iff1 = false;
    state.iff2 = false;
}

fn ei(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.iff1 = true;
    state.iff2 = true;
}

fn ld_sp_hl(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.sp = state.idx();
}

fn ex_af(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.exchange_af();
}

fn exx(state: &mut CoreState, _bus: &mut dyn CpuBus) {
    state.exchange_shadow();
}

fn relative_jump(state: &mut CoreState, d: u8) {
    state.pc = state.pc.wrapping_add(d as i8 as i16 as u16);
}

fn djnz(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let d = core::fetch_u8(state, bus);
    state.b = state.b.wrapping_sub(1);
    if state.b != 0 {
        relative_jump(state, d);
        state.add_extra(5);
    }
}

fn jr(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let d = core::fetch_u8(state, bus);
    relative_jump(state, d);
}

fn jr_cc(state: &mut CoreState, bus: &mut dyn CpuBus) {
    let d = core::fetch_u8(state, bus);
    // JR NZ/Z/NC/C use the first four condition codes
    if state.condition((state.opcode >> 3) & 3) {
        relative_jump(state, d);
        state.add_extra(5);
    }
}
