// Instruction timing and effects, one opcode family at a time.

use super::tests::{setup_8080, setup_z80};
use crate::cpu_core::{CF, HF, NF, PF, SF, ZF};

#[test]
fn test_djnz_taken_and_not_taken() {
    let (mut cpu, mut bus) = setup_z80(&[0x10, 0xFE]);
    cpu.state.b = 2;
    assert_eq!(cpu.step(&mut bus), 13);
    assert_eq!(cpu.pc(), 0x0000);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(cpu.state.b, 0);
}

#[test]
fn test_jr_cc_costs() {
    // JR NZ,+2 with Z set falls through, JR Z,-4 jumps back
    let (mut cpu, mut bus) = setup_z80(&[0x20, 0x02, 0x28, 0xFC]);
    cpu.state.f = ZF;
    assert_eq!(cpu.step(&mut bus), 7);
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(cpu.step(&mut bus), 12);
    assert_eq!(cpu.pc(), 0x0000);
}

#[test]
fn test_call_and_ret_cc_costs() {
    // CALL NZ,0010 ; CALL Z,0010 ... at 0010: RET Z ; RET NZ
    let (mut cpu, mut bus) = setup_z80(&[0xC4, 0x10, 0x00, 0xCC, 0x10, 0x00]);
    bus.load_program(&[0xC8, 0xC0], 0x0010);
    cpu.state.f = ZF;
    assert_eq!(cpu.step(&mut bus), 10);
    assert_eq!(cpu.pc(), 0x0003);
    assert_eq!(cpu.step(&mut bus), 17);
    assert_eq!(cpu.pc(), 0x0010);
    assert_eq!(cpu.step(&mut bus), 11);
    assert_eq!(cpu.pc(), 0x0006);

    cpu.state.pc = 0x0011;
    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(cpu.pc(), 0x0012);
}

#[test]
fn test_8080_call_cc_costs() {
    let (mut cpu, mut bus) = setup_8080(&[0xC4, 0x10, 0x00, 0xCC, 0x10, 0x00]);
    cpu.state.f = ZF | 0x02;
    assert_eq!(cpu.step(&mut bus), 11);
    assert_eq!(cpu.step(&mut bus), 17);
    assert_eq!(cpu.pc(), 0x0010);
}

#[test]
fn test_index_register_forms() {
    let (mut cpu, mut bus) = setup_z80(&[
        0xDD, 0x21, 0x00, 0x20, // LD IX,2000
        0xDD, 0x36, 0x05, 0x99, // LD (IX+5),99
        0xDD, 0x7E, 0x05, // LD A,(IX+5)
        0xDD, 0x34, 0xFF, // INC (IX-1)
        0xDD, 0x24, // INC IXH
        0xDD, 0x66, 0x05, // LD H,(IX+5)
        0xDD, 0x00, // NOP behind a prefix
    ]);
    bus.memory[0x2105] = 0x5A;
    assert_eq!(cpu.step(&mut bus), 14);
    assert_eq!(cpu.state.ix, 0x2000);
    assert_eq!(cpu.step(&mut bus), 19);
    assert_eq!(bus.memory[0x2005], 0x99);
    assert_eq!(cpu.step(&mut bus), 19);
    assert_eq!(cpu.state.a, 0x99);
    assert_eq!(cpu.step(&mut bus), 23);
    assert_eq!(bus.memory[0x1FFF], 0x01);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.state.ix, 0x2100);
    assert_eq!(cpu.step(&mut bus), 19);
    // (IX+d) loads target plain H, not IXH
    assert_eq!(cpu.state.h, 0x5A);
    assert_eq!(cpu.state.ix, 0x2100);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.pc(), 0x0015);
}

#[test]
fn test_iy_uses_its_own_register() {
    // LD IY,3000 ; LD (IY+1),A
    let (mut cpu, mut bus) = setup_z80(&[0xFD, 0x21, 0x00, 0x30, 0xFD, 0x77, 0x01]);
    cpu.state.a = 0x4E;
    cpu.state.ix = 0x1111;
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 19);
    assert_eq!(bus.memory[0x3001], 0x4E);
    assert_eq!(cpu.state.ix, 0x1111);
    assert_eq!(cpu.state.hl(), 0x0000);
}

#[test]
fn test_cb_page() {
    // RLC B ; BIT 7,(HL) ; SET 3,(HL)
    let (mut cpu, mut bus) = setup_z80(&[0xCB, 0x00, 0xCB, 0x7E, 0xCB, 0xDE]);
    cpu.state.b = 0x81;
    cpu.state.set_hl(0x4000);
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.state.b, 0x03);
    assert!(cpu.state.flag(CF));
    assert_eq!(cpu.step(&mut bus), 12);
    assert!(cpu.state.flag(ZF));
    assert_eq!(cpu.step(&mut bus), 15);
    assert_eq!(bus.memory[0x4000], 0x08);
}

#[test]
fn test_indexed_cb_page() {
    // LD IX,2000 ; SET 0,(IX+2),A ; BIT 0,(IX+2)
    let (mut cpu, mut bus) = setup_z80(&[
        0xDD, 0x21, 0x00, 0x20, 0xDD, 0xCB, 0x02, 0xC7, 0xDD, 0xCB, 0x02, 0x46,
    ]);
    bus.memory[0x2002] = 0x40;
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 23);
    assert_eq!(bus.memory[0x2002], 0x41);
    assert_eq!(cpu.state.a, 0x41);
    assert_eq!(cpu.step(&mut bus), 20);
    assert!(!cpu.state.flag(ZF));
    assert_eq!(cpu.pc(), 0x000C);
}

#[test]
fn test_ldir_repeats_until_bc_is_zero() {
    // LDIR
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0xB0]);
    bus.load_program(&[1, 2, 3], 0x1000);
    cpu.state.set_hl(0x1000);
    cpu.state.set_de(0x2000);
    cpu.state.set_bc(3);
    assert_eq!(cpu.step(&mut bus), 21);
    assert_eq!(cpu.pc(), 0x0000);
    assert_eq!(cpu.step(&mut bus), 21);
    assert_eq!(cpu.step(&mut bus), 16);
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(&bus.memory[0x2000..0x2003], &[1, 2, 3]);
    assert_eq!(cpu.state.bc(), 0);
    assert!(!cpu.state.flag(PF));
}

#[test]
fn test_cpir_stops_on_match() {
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0xB1]);
    bus.load_program(&[0x11, 0x33, 0x55], 0x1000);
    cpu.state.a = 0x33;
    cpu.state.set_hl(0x1000);
    cpu.state.set_bc(3);
    assert_eq!(cpu.step(&mut bus), 21);
    assert_eq!(cpu.step(&mut bus), 16);
    assert!(cpu.state.flag(ZF));
    assert!(cpu.state.flag(PF));
    assert_eq!(cpu.state.hl(), 0x1002);
    assert_eq!(cpu.state.bc(), 1);
    assert_eq!(cpu.pc(), 0x0002);
}

#[test]
fn test_ed_arithmetic() {
    // NEG ; SBC HL,DE
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0x44, 0xED, 0x52]);
    cpu.state.a = 0x01;
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.state.a, 0xFF);
    assert!(cpu.state.flag(CF));
    assert!(cpu.state.flag(NF));
    assert!(cpu.state.flag(SF));

    cpu.state.set_hl(0x1000);
    cpu.state.set_de(0x0001);
    assert_eq!(cpu.step(&mut bus), 15);
    assert_eq!(cpu.state.hl(), 0x0FFE);
    assert!(!cpu.state.flag(CF));
    assert!(cpu.state.flag(NF));
}

#[test]
fn test_unlisted_ed_opcode_is_nop() {
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0x00]);
    let a = cpu.state.a;
    assert_eq!(cpu.step(&mut bus), 8);
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(cpu.state.a, a);
}

#[test]
fn test_im_selection() {
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0x5E, 0xED, 0x56, 0xED, 0x46]);
    cpu.step(&mut bus);
    assert_eq!(cpu.interrupt_mode(), 2);
    cpu.step(&mut bus);
    assert_eq!(cpu.interrupt_mode(), 1);
    cpu.step(&mut bus);
    assert_eq!(cpu.interrupt_mode(), 0);
}

#[test]
fn test_rld() {
    let (mut cpu, mut bus) = setup_z80(&[0xED, 0x6F]);
    cpu.state.a = 0x12;
    cpu.state.set_hl(0x3000);
    bus.memory[0x3000] = 0x34;
    assert_eq!(cpu.step(&mut bus), 18);
    assert_eq!(bus.memory[0x3000], 0x42);
    assert_eq!(cpu.state.a, 0x13);
}

#[test]
fn test_exchanges() {
    // EX AF,AF' ; EXX
    let (mut cpu, mut bus) = setup_z80(&[0x08, 0xD9]);
    cpu.state.a = 0x11;
    cpu.state.a_alt = 0x22;
    cpu.state.set_bc(0x3333);
    cpu.state.b_alt = 0x44;
    cpu.state.c_alt = 0x55;
    cpu.step(&mut bus);
    assert_eq!(cpu.state.a, 0x22);
    assert_eq!(cpu.state.a_alt, 0x11);
    cpu.step(&mut bus);
    assert_eq!(cpu.state.bc(), 0x4455);
    assert_eq!(cpu.state.b_alt, 0x33);
}

#[test]
fn test_add_flags_per_model() {
    // ADD A,1 on 7F
    let (mut cpu, mut bus) = setup_z80(&[0xC6, 0x01]);
    cpu.state.a = 0x7F;
    cpu.step(&mut bus);
    assert_eq!(cpu.state.a, 0x80);
    assert_eq!(cpu.state.f, SF | HF | PF);

    let (mut cpu, mut bus) = setup_8080(&[0xC6, 0x01]);
    cpu.state.a = 0x7F;
    cpu.step(&mut bus);
    assert_eq!(cpu.state.a, 0x80);
    // P is parity here, not overflow; bit 1 always reads set
    assert_eq!(cpu.state.f, SF | HF | 0x02);
}

#[test]
fn test_daa_after_bcd_add() {
    // ADD A,27 ; DAA
    let (mut cpu, mut bus) = setup_z80(&[0xC6, 0x27, 0x27]);
    cpu.state.a = 0x15;
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(cpu.state.a, 0x42);
    assert!(!cpu.state.flag(CF));
    assert!(cpu.state.flag(PF));

    let (mut cpu, mut bus) = setup_8080(&[0xC6, 0x27, 0x27]);
    cpu.state.a = 0x95;
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(cpu.state.a, 0x22);
    assert!(cpu.state.flag(CF));
}

#[test]
fn test_8080_undocumented_aliases() {
    // 08 = NOP, CB = JMP, DD = CALL
    let (mut cpu, mut bus) = setup_8080(&[0x08, 0xCB, 0x10, 0x00]);
    bus.load_program(&[0xDD, 0x00, 0x30], 0x0010);
    assert_eq!(cpu.step(&mut bus), 4);
    assert_eq!(cpu.step(&mut bus), 10);
    assert_eq!(cpu.pc(), 0x0010);
    assert_eq!(cpu.step(&mut bus), 17);
    assert_eq!(cpu.pc(), 0x3000);
    assert_eq!(bus.memory[cpu.sp() as usize], 0x13);
}

#[test]
fn test_8080_psw_keeps_fixed_bits() {
    // LXI H,FFFF ; PUSH H ; POP PSW ; PUSH PSW
    let (mut cpu, mut bus) = setup_8080(&[0x21, 0xFF, 0xFF, 0xE5, 0xF1, 0xF5]);
    for _ in 0..4 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.state.a, 0xFF);
    assert_eq!(cpu.state.f, 0xD7);
    assert_eq!(bus.memory[cpu.sp() as usize], 0xD7);
}

#[test]
fn test_8080_has_no_relative_jumps() {
    // 10 and 18 are NOPs on the 8080
    let (mut cpu, mut bus) = setup_8080(&[0x10, 0xFE, 0x18]);
    cpu.state.b = 5;
    assert_eq!(cpu.step(&mut bus), 4);
    assert_eq!(cpu.pc(), 0x0001);
    assert_eq!(cpu.state.b, 5);
}

#[test]
fn test_prefix_run_over_whole_address_space() {
    let (mut cpu, mut bus) = setup_z80(&[]);
    bus.memory.fill(0xDD);
    for _ in 0..0x10000 {
        assert_eq!(cpu.step(&mut bus), 4);
    }
    assert_eq!(cpu.pc(), 0x0000);
    assert_eq!(cpu.total_cycles(), 4 * 0x10000);
    assert_eq!(cpu.state.ix, 0);
}

#[test]
fn test_last_of_repeated_prefixes_wins() {
    // DD FD LD IY,1234
    let (mut cpu, mut bus) = setup_z80(&[0xDD, 0xFD, 0x21, 0x34, 0x12]);
    assert_eq!(cpu.step(&mut bus), 4);
    assert_eq!(cpu.pc(), 0x0001);
    assert_eq!(cpu.step(&mut bus), 14);
    assert_eq!(cpu.state.iy, 0x1234);
    assert_eq!(cpu.state.ix, 0x0000);
    assert_eq!(cpu.state.hl(), 0x0000);
    assert_eq!(cpu.refresh(), 2);
}

#[test]
fn test_8080_push_psw_after_reset() {
    let (mut cpu, mut bus) = setup_8080(&[0xF5]);
    cpu.reset();
    assert_eq!(cpu.step(&mut bus), 11);
    assert_eq!(bus.memory[cpu.sp() as usize], 0x02);
    assert_eq!(bus.memory[cpu.sp() as usize + 1], 0x00);
}
