mod common;

use common::{cpu_with_program, stack_top, STACK_TOP};
use g10_isa::{Flags, RegId};
use g10_vm::RESET_PC;

#[test]
fn ld_then_add_sets_carry_chain_flags() {
    // LD l0, $FF ; ADD l0, $01
    let mut cpu = cpu_with_program(&[0x10, 0x00, 0xFF, 0x50, 0x00, 0x01]);
    assert!(cpu.tick());
    assert_eq!(cpu.registers().read(RegId::L0), 0xFF);

    assert!(cpu.tick());
    let regs = cpu.registers();
    assert_eq!(regs.read(RegId::L0), 0x00);
    assert!(regs.flags.zero());
    assert!(!regs.flags.negative());
    assert!(regs.flags.half_carry());
    assert!(regs.flags.carry());
    assert!(!regs.flags.overflow());
}

#[test]
fn narrow_loads_keep_sibling_bits() {
    // LD d2, $11223344 ; LD l2, $AA
    let mut cpu = cpu_with_program(&[
        0x30, 0x20, 0x44, 0x33, 0x22, 0x11, // ld d2, imm32
        0x10, 0x20, 0xAA, // ld l2, imm8
    ]);
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::d(2)), 0x1122_33AA);
}

#[test]
fn jmp_taken_and_not_taken() {
    // JMP nc, $2040 lands; JMP zs, ... at $2040 falls through (Z clear).
    let mut cpu = cpu_with_program(&[0x40, 0x00, 0x40, 0x20, 0x00, 0x00]);
    cpu.bus_mut().rom[0x2040..0x2046]
        .copy_from_slice(&[0x40, 0x10, 0x00, 0x30, 0x00, 0x00]);
    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, 0x2040);
    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, 0x2046);
}

#[test]
fn jpb_is_relative_to_the_next_instruction() {
    // JPB nc, +4 : next pc = $2004, target = $2008.
    let mut cpu = cpu_with_program(&[0x42, 0x00, 0x04, 0x00]);
    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, 0x2008);
}

#[test]
fn jpb_negative_offset() {
    // NOP ; JPB nc, -6 jumps back to the NOP.
    let mut cpu = cpu_with_program(&[0x00, 0x00, 0x42, 0x00, 0xFA, 0xFF]);
    cpu.tick();
    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, RESET_PC);
}

#[test]
fn call_and_ret() {
    // CALL nc, $2040 ... RET nc at $2040.
    let mut cpu = cpu_with_program(&[0x43, 0x00, 0x40, 0x20, 0x00, 0x00]);
    cpu.bus_mut().rom[0x2040..0x2042].copy_from_slice(&[0x45, 0x00]);

    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, 0x2040);
    assert_eq!(cpu.registers().sp, STACK_TOP - 4);
    assert_eq!(stack_top(&mut cpu), 0x2006);

    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, 0x2006);
    assert_eq!(cpu.registers().sp, STACK_TOP);
}

#[test]
fn conditional_ret_not_taken() {
    // RET zs with Z clear falls through.
    let mut cpu = cpu_with_program(&[0x45, 0x10]);
    assert!(cpu.tick());
    assert_eq!(cpu.registers().pc, RESET_PC + 2);
}

#[test]
fn push_pop_round_trip() {
    // LD d3, imm ; PUSH d3 ; POP d7
    let mut cpu = cpu_with_program(&[
        0x30, 0x30, 0x78, 0x56, 0x34, 0x12, // ld d3, $12345678
        0x3C, 0x30, // push d3
        0x36, 0x70, // pop d7
    ]);
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().sp, STACK_TOP - 4);
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::d(7)), 0x1234_5678);
    assert_eq!(cpu.registers().sp, STACK_TOP);
}

#[test]
fn quick_and_port_windows() {
    // The short addressing windows live at the top of the address space, so
    // this test uses a dedicated bus backing 0xFFFF0000..=0xFFFFFFFF.
    struct WindowBus {
        rom: Vec<u8>,
        high: Vec<u8>, // backs 0xFFFF0000..=0xFFFFFFFF
    }
    impl g10_vm::Bus for WindowBus {
        fn read(&mut self, addr: u32) -> Result<u8, g10_vm::BusFault> {
            if addr < 0x8000_0000 {
                self.rom
                    .get(addr as usize)
                    .copied()
                    .ok_or(g10_vm::BusFault::Read(addr))
            } else if addr >= 0xFFFF_0000 {
                Ok(self.high[(addr - 0xFFFF_0000) as usize])
            } else {
                Err(g10_vm::BusFault::Read(addr))
            }
        }
        fn write(&mut self, addr: u32, value: u8) -> Result<(), g10_vm::BusFault> {
            if addr >= 0xFFFF_0000 {
                self.high[(addr - 0xFFFF_0000) as usize] = value;
                Ok(())
            } else {
                Err(g10_vm::BusFault::Write(addr))
            }
        }
    }
    let mut rom = vec![0u8; 0x3000];
    let code = [
        0x10u8, 0x00, 0x5A, // ld l0, $5A
        0x19, 0x00, 0x34, 0x12, // stq [$1234], l0
        0x15, 0x10, 0x80, // ldp l1, [$80]
    ];
    rom[0x2000..0x2000 + code.len()].copy_from_slice(&code);
    let mut window = WindowBus {
        rom,
        high: vec![0; 0x1_0000],
    };
    window.high[0xFF80] = 0x77; // $FFFFFF00 + $80
    let mut cpu = g10_vm::Cpu::new(window);

    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.bus().high[0x1234], 0x5A);
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::l(1)), 0x77);
}

#[test]
fn mwh_and_mwl_move_the_high_half() {
    let mut cpu = cpu_with_program(&[
        0x20, 0x10, 0xCD, 0xAB, // ld w1, $ABCD
        0x2E, 0x21, // mwh d2, w1
        0x2F, 0x32, // mwl w3, d2
    ]);
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::d(2)), 0xABCD_0000);
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::w(3)), 0xABCD);
}

#[test]
fn swap_variants() {
    let mut cpu = cpu_with_program(&[
        0x10, 0x00, 0xAB, // ld l0, $AB
        0x86, 0x00, // swap l0
        0x20, 0x10, 0x34, 0x12, // ld w1, $1234
        0x88, 0x10, // swap w1
        0x30, 0x20, 0x78, 0x56, 0x34, 0x12, // ld d2, $12345678
        0x89, 0x20, // swap d2
    ]);
    for _ in 0..6 {
        assert!(cpu.tick());
    }
    assert_eq!(cpu.registers().read(RegId::L0), 0xBA);
    assert_eq!(cpu.registers().read(RegId::w(1)), 0x3412);
    assert_eq!(cpu.registers().read(RegId::d(2)), 0x5678_1234);
}

#[test]
fn rotate_through_carry() {
    // SCF ; RLA : carry rotates into bit 0, bit 7 out to carry.
    let mut cpu = cpu_with_program(&[
        0x10, 0x00, 0x80, // ld l0, $80
        0x07, 0x00, // scf
        0x90, 0x00, // rla
    ]);
    cpu.tick();
    cpu.tick();
    cpu.tick();
    let regs = cpu.registers();
    assert_eq!(regs.read(RegId::L0), 0x01);
    assert!(regs.flags.carry());
    assert!(!regs.flags.zero()); // accumulator form forces Z clear
}

#[test]
fn bit_test_and_modify() {
    let mut cpu = cpu_with_program(&[
        0x10, 0x00, 0x02, // ld l0, $02
        0xA0, 0x01, // bit 1, l0
        0xA0, 0x02, // bit 2, l0
        0xA2, 0x07, // set 7, l0
        0xA4, 0x01, // res 1, l0
        0xA6, 0x00, // tog 0, l0
    ]);
    cpu.tick();
    cpu.tick();
    assert!(!cpu.registers().flags.zero()); // bit 1 is set
    cpu.tick();
    assert!(cpu.registers().flags.zero()); // bit 2 is clear
    cpu.tick();
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::L0), 0x81);
}

#[test_case::test_case(0x80, 0x80, 0x00, true ; "sla shifts out bit 7")]
#[test_case::test_case(0x82, 0xC1, 0xE0, true ; "sra keeps the sign bit")]
#[test_case::test_case(0x84, 0xC1, 0x60, true ; "srl clears bit 7")]
fn shift_forms(form: u8, input: u8, expected: u8, carry: bool) {
    let mut cpu = cpu_with_program(&[0x10, 0x00, input, form, 0x00]);
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::L0), u32::from(expected));
    assert_eq!(cpu.registers().flags.carry(), carry);
}

#[test]
fn cmp_discards_the_result() {
    let mut cpu = cpu_with_program(&[
        0x10, 0x00, 0x10, // ld l0, $10
        0x7D, 0x00, 0x10, // cmp l0, $10
    ]);
    cpu.tick();
    cpu.tick();
    let regs = cpu.registers();
    assert_eq!(regs.read(RegId::L0), 0x10);
    assert!(regs.flags.zero());
    assert!(regs.flags.negative());
}

#[test]
fn indirect_rmw_writes_back() {
    // Write through [d1] in RAM: LD d1, addr ; INC [d1] twice.
    let mut cpu = cpu_with_program(&[
        0x30, 0x10, 0x00, 0x00, 0x00, 0x80, // ld d1, $80000000
        0x5D, 0x10, // inc [d1]
        0x5D, 0x10, // inc [d1]
    ]);
    cpu.tick();
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.bus().ram[0], 2);
}

#[test]
fn sixteen_bit_accumulator_add() {
    let mut cpu = cpu_with_program(&[
        0x20, 0x00, 0xFF, 0xFF, // ld w0, $FFFF
        0x60, 0x00, 0x01, 0x00, // add w0, $0001
    ]);
    cpu.tick();
    cpu.tick();
    let regs = cpu.registers();
    assert_eq!(regs.read(RegId::W0), 0);
    assert!(regs.flags.zero());
    assert!(regs.flags.carry());
}

#[test]
fn every_memory_byte_costs_a_machine_cycle() {
    // LD l0, imm8: 2 opcode bytes + 1 immediate = 3 M-cycles.
    let mut cpu = cpu_with_program(&[0x10, 0x00, 0xAA]);
    cpu.tick();
    assert_eq!(cpu.m_cycles(), 3);
    assert_eq!(cpu.t_cycles(), 12);
    assert_eq!(cpu.bus().ticked_m_cycles, 3);
}

#[test]
fn daa_after_bcd_add() {
    // 0x15 + 0x27 -> DAA -> 0x42.
    let mut cpu = cpu_with_program(&[
        0x10, 0x00, 0x15, // ld l0, $15
        0x50, 0x00, 0x27, // add l0, $27
        0x06, 0x00, // daa
    ]);
    cpu.tick();
    cpu.tick();
    cpu.tick();
    assert_eq!(cpu.registers().read(RegId::L0), 0x42);
    assert!(!cpu.registers().flags.carry());
}

#[test]
fn flag_bits_land_where_documented() {
    let mut cpu = cpu_with_program(&[0x07, 0x00, 0x0A, 0x00]); // scf ; sev
    cpu.tick();
    cpu.tick();
    let byte = cpu.registers().flags.to_u8();
    assert_eq!(byte & Flags::C.bits(), 1 << 4);
    assert_eq!(byte & Flags::V.bits(), 1 << 3);
}
