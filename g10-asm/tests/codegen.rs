use g10_asm::ast::{
    AssignOp, Directive, Expr, Instruction, Item, Module, Operand,
};
use g10_asm::diag::SourceLoc;
use g10_asm::{AsmErrorKind, Codegen};
use g10_isa::{Cond, Mnemonic, RegId};
use g10_obj::{Object, ObjectFlags, RelocKind, SymbolBinding, SECTION_UNDEF};

fn loc() -> SourceLoc {
    SourceLoc::default()
}

fn org(addr: i64) -> Item {
    Item::Directive {
        dir: Directive::Org(Expr::int(addr)),
        loc: loc(),
    }
}

fn dir(dir: Directive) -> Item {
    Item::Directive { dir, loc: loc() }
}

fn label(name: &str) -> Item {
    Item::Label {
        name: name.into(),
        loc: loc(),
    }
}

fn instr(mnemonic: Mnemonic, operands: Vec<Operand>) -> Item {
    Item::Instruction(Instruction::new(mnemonic, operands))
}

fn imm(value: i64) -> Operand {
    Operand::Immediate(Expr::int(value))
}

fn assemble(items: Vec<Item>) -> Object {
    Codegen::process(&Module::new(items)).unwrap()
}

fn assemble_err(items: Vec<Item>) -> AsmErrorKind {
    Codegen::process(&Module::new(items)).unwrap_err().kind
}

#[test]
fn smallest_valid_object() {
    // .org $2000  nop  halt
    let obj = assemble(vec![
        org(0x2000),
        instr(Mnemonic::Nop, vec![]),
        instr(Mnemonic::Halt, vec![]),
    ]);

    assert_eq!(obj.sections().len(), 1);
    let text = &obj.sections()[0];
    assert_eq!(text.virtual_address, 0x2000);
    assert_eq!(text.data, vec![0x00, 0x00, 0x02, 0x00]);
    assert_eq!(text.size, 4);
    assert!(obj.symbols().is_empty());
    assert!(obj.relocations().is_empty());
    assert_eq!(obj.flags(), ObjectFlags::empty());
}

#[test]
fn smallest_object_round_trips() {
    let obj = assemble(vec![
        org(0x2000),
        instr(Mnemonic::Nop, vec![]),
        instr(Mnemonic::Halt, vec![]),
    ]);
    let bytes = obj.to_bytes().unwrap();
    assert_eq!(Object::from_bytes(&bytes).unwrap(), obj);
}

#[test]
fn forward_jump_resolves_the_label() {
    // .org $2000  jmp start  .byte 0,0  start: nop
    let obj = assemble(vec![
        org(0x2000),
        instr(
            Mnemonic::Jmp,
            vec![Operand::Immediate(Expr::ident("start"))],
        ),
        dir(Directive::Byte(vec![Expr::int(0), Expr::int(0)])),
        label("start"),
        instr(Mnemonic::Nop, vec![]),
    ]);

    let text = &obj.sections()[0];
    // JMP is six bytes and the two padding bytes follow, so the label
    // lands at $2008.
    assert_eq!(
        text.data,
        vec![0x40, 0x00, 0x08, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    let start = &obj.symbols()[obj.find_symbol("start").unwrap()];
    assert_eq!(start.value, 0x2008);
    assert_eq!(start.binding, SymbolBinding::Local);
    assert!(obj.relocations().is_empty());
}

#[test]
fn external_call_emits_one_relocation() {
    // .extern foo  .org $2000  call foo
    let obj = assemble(vec![
        dir(Directive::Extern(vec!["foo".into()])),
        org(0x2000),
        instr(
            Mnemonic::Call,
            vec![Operand::Immediate(Expr::ident("foo"))],
        ),
    ]);

    let text = &obj.sections()[0];
    assert_eq!(text.data, vec![0x43, 0x00, 0x00, 0x00, 0x00, 0x00]);

    let foo_index = obj.find_symbol("foo").unwrap();
    let foo = &obj.symbols()[foo_index];
    assert_eq!(foo.binding, SymbolBinding::Extern);
    assert_eq!(foo.section, SECTION_UNDEF);
    assert_eq!(foo.value, 0);

    assert_eq!(obj.relocations().len(), 1);
    let reloc = &obj.relocations()[0];
    assert_eq!(reloc.offset, 2);
    assert_eq!(reloc.kind, RelocKind::Abs32);
    assert_eq!(reloc.addend, 0);
    assert_eq!(reloc.symbol, foo_index as u32);
    assert!(obj.flags().contains(ObjectFlags::RELOCATABLE));
}

#[test]
fn conditional_assembly_survivor() {
    // The preprocessor keeps exactly one branch; codegen sees one load.
    let obj = assemble(vec![
        org(0x2000),
        instr(
            Mnemonic::Ld,
            vec![Operand::Register(RegId::L0), imm(0xAA)],
        ),
    ]);
    assert_eq!(obj.sections()[0].data, vec![0x10, 0x00, 0xAA]);
}

#[test]
fn sizes_match_emission_for_every_immediate_shape() {
    // Interleave labels with instructions of every immediate width and
    // check each label lands exactly where the emitted bytes say it
    // should. This pins the address pass to the emission pass.
    let expected_lengths: [(Item, u32); 10] = [
        (instr(Mnemonic::Nop, vec![]), 2),
        (
            instr(Mnemonic::Ld, vec![Operand::Register(RegId::l(3)), imm(0x12)]),
            3,
        ),
        (
            instr(
                Mnemonic::Ld,
                vec![Operand::Register(RegId::w(2)), imm(0x1234)],
            ),
            4,
        ),
        (
            instr(
                Mnemonic::Ld,
                vec![Operand::Register(RegId::d(1)), imm(0x1234_5678)],
            ),
            6,
        ),
        (
            instr(
                Mnemonic::Ldq,
                vec![
                    Operand::Register(RegId::l(0)),
                    Operand::Direct(Expr::int(0x10)),
                ],
            ),
            4,
        ),
        (
            instr(
                Mnemonic::Ldp,
                vec![
                    Operand::Register(RegId::l(0)),
                    Operand::Direct(Expr::int(0x10)),
                ],
            ),
            3,
        ),
        (
            instr(
                Mnemonic::St,
                vec![
                    Operand::Direct(Expr::int(0x2000)),
                    Operand::Register(RegId::w(5)),
                ],
            ),
            6,
        ),
        (
            instr(Mnemonic::Jpb, vec![imm(4)]),
            4,
        ),
        (
            instr(Mnemonic::Add, vec![Operand::Register(RegId::W0), imm(7)]),
            4,
        ),
        (
            instr(
                Mnemonic::Bit,
                vec![imm(5), Operand::Register(RegId::l(2))],
            ),
            2,
        ),
    ];

    let mut items = vec![org(0x2000)];
    let mut offsets = Vec::new();
    let mut running = 0;
    for (index, (item, len)) in expected_lengths.into_iter().enumerate() {
        items.push(item);
        running += len;
        offsets.push(running);
        items.push(label(&format!("after_{index}")));
    }

    let obj = assemble(items);
    assert_eq!(obj.sections()[0].data.len() as u32, running);
    for (index, offset) in offsets.into_iter().enumerate() {
        let symbol =
            &obj.symbols()[obj.find_symbol(&format!("after_{index}")).unwrap()];
        assert_eq!(
            symbol.value,
            0x2000 + offset,
            "label after_{index} misplaced"
        );
    }
}

#[test]
fn quick_and_port_relocations() {
    let obj = assemble(vec![
        dir(Directive::Extern(vec!["qvar".into(), "pvar".into()])),
        org(0x2000),
        instr(
            Mnemonic::Ldq,
            vec![
                Operand::Register(RegId::l(0)),
                Operand::Direct(Expr::ident("qvar")),
            ],
        ),
        instr(
            Mnemonic::Ldp,
            vec![
                Operand::Register(RegId::l(0)),
                Operand::Direct(Expr::ident("pvar")),
            ],
        ),
        instr(Mnemonic::Jpb, vec![Operand::Immediate(Expr::ident("qvar"))]),
    ]);

    let kinds: Vec<RelocKind> =
        obj.relocations().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![RelocKind::Quick16, RelocKind::Port8, RelocKind::Rel16]
    );
    // Each relocation points at the first byte of its immediate slot.
    let offsets: Vec<u32> =
        obj.relocations().iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![2, 6, 9]);
}

#[test]
fn extern_with_constant_offset_becomes_the_addend() {
    let obj = assemble(vec![
        dir(Directive::Extern(vec!["table".into()])),
        org(0x2000),
        instr(
            Mnemonic::Ld,
            vec![
                Operand::Register(RegId::d(0)),
                Operand::Direct(Expr::add(Expr::ident("table"), Expr::int(8))),
            ],
        ),
    ]);
    assert_eq!(obj.relocations()[0].addend, 8);
}

#[test]
fn quick_window_addresses_are_window_relative() {
    let obj = assemble(vec![
        org(0x2000),
        instr(
            Mnemonic::Stq,
            vec![
                Operand::Direct(Expr::int(0xFFFF_1234)),
                Operand::Register(RegId::l(0)),
            ],
        ),
    ]);
    // STQ [$1234], l0: opcode 19 00, then the 16-bit window offset.
    assert_eq!(obj.sections()[0].data, vec![0x19, 0x00, 0x34, 0x12]);
}

#[test]
fn relative_branch_is_pc_relative() {
    let obj = assemble(vec![
        org(0x2000),
        label("top"),
        instr(Mnemonic::Nop, vec![]),
        instr(Mnemonic::Jpb, vec![Operand::Immediate(Expr::ident("top"))]),
    ]);
    // JPB sits at $2002, ends at $2006; top is $2000 -> offset -6.
    let data = &obj.sections()[0].data;
    assert_eq!(&data[2..], &[0x42, 0x00, 0xFA, 0xFF]);
}

#[test]
fn relative_branch_out_of_range_is_an_error() {
    let err = assemble_err(vec![
        org(0x2000),
        label("near"),
        org(0x2_0000),
        instr(
            Mnemonic::Jpb,
            vec![Operand::Immediate(Expr::ident("near"))],
        ),
    ]);
    assert!(matches!(err, AsmErrorKind::RelativeOffsetOutOfRange(_)));
}

#[test]
fn immediates_never_wrap_silently() {
    let err = assemble_err(vec![
        org(0x2000),
        instr(Mnemonic::Ld, vec![Operand::Register(RegId::L0), imm(256)]),
    ]);
    assert!(matches!(
        err,
        AsmErrorKind::ImmediateOutOfRange { value: 256, bits: 8 }
    ));

    // Signed values down to -128 still fit the 8-bit slot.
    let obj = assemble(vec![
        org(0x2000),
        instr(Mnemonic::Ld, vec![Operand::Register(RegId::L0), imm(-128)]),
    ]);
    assert_eq!(obj.sections()[0].data, vec![0x10, 0x00, 0x80]);
}

#[test]
fn instructions_in_ram_are_rejected() {
    let err = assemble_err(vec![
        org(0x8000_0000u32 as i64),
        instr(Mnemonic::Nop, vec![]),
    ]);
    assert!(matches!(err, AsmErrorKind::InstructionsNotAllowedInRam));
}

#[test]
fn ram_data_reserves_without_bytes() {
    let obj = assemble(vec![
        org(0x8000_0000u32 as i64),
        dir(Directive::Byte(vec![Expr::int(64)])),
        label("buffer"),
        dir(Directive::Word(vec![Expr::int(2)])),
    ]);

    let bss = &obj.sections()[1];
    assert_eq!(bss.virtual_address, 0x8000_0000);
    assert_eq!(bss.size, 64 + 4);
    assert!(bss.data.is_empty());

    let buffer = &obj.symbols()[obj.find_symbol("buffer").unwrap()];
    assert_eq!(buffer.value, 0x8000_0040);
}

#[test]
fn rom_and_ram_counters_are_independent() {
    let obj = assemble(vec![
        org(0x2000),
        instr(Mnemonic::Nop, vec![]),
        dir(Directive::Ram),
        dir(Directive::Byte(vec![Expr::int(16)])),
        dir(Directive::Rom),
        label("resumed"),
        instr(Mnemonic::Nop, vec![]),
    ]);

    // The ROM counter resumes where it left off; the return opens a fresh
    // code section right after the first one.
    let resumed = &obj.symbols()[obj.find_symbol("resumed").unwrap()];
    assert_eq!(resumed.value, 0x2002);
    let second = obj
        .sections()
        .iter()
        .find(|s| s.virtual_address == 0x2002)
        .expect("resumed code section");
    assert_eq!(second.data, vec![0x00, 0x00]);
}

#[test]
fn byte_strings_emit_their_bytes() {
    let obj = assemble(vec![
        org(0x2000),
        dir(Directive::Byte(vec![
            Expr::Str("Hi".into(), loc()),
            Expr::int(0),
        ])),
        label("end"),
    ]);
    assert_eq!(obj.sections()[0].data, b"Hi\0");
    let end = &obj.symbols()[obj.find_symbol("end").unwrap()];
    assert_eq!(end.value, 0x2003);
}

#[test]
fn int_directive_targets_a_vector_slot() {
    let obj = assemble(vec![
        dir(Directive::Int(Expr::int(2))),
        instr(Mnemonic::Reti, vec![]),
        org(0x2000),
        instr(Mnemonic::Nop, vec![]),
    ]);

    let vector_section = obj
        .sections()
        .iter()
        .find(|s| s.virtual_address == 0x1100)
        .expect("vector slot section");
    assert_eq!(vector_section.data, vec![0x46, 0x00]);
}

#[test]
fn vector_out_of_range_is_an_error() {
    let err = assemble_err(vec![dir(Directive::Int(Expr::int(32)))]);
    assert!(matches!(err, AsmErrorKind::VectorOutOfRange(32)));
}

#[test]
fn label_redefinition_is_an_error() {
    let err = assemble_err(vec![
        org(0x2000),
        label("here"),
        label("here"),
    ]);
    assert!(matches!(
        err,
        AsmErrorKind::LabelRedefinition(name) if name == "here"
    ));
}

#[test]
fn undefined_global_fails_finalize() {
    let err = assemble_err(vec![
        dir(Directive::Global(vec!["exported".into()])),
        org(0x2000),
        instr(Mnemonic::Nop, vec![]),
    ]);
    assert!(matches!(err, AsmErrorKind::GlobalSymbolUndefined(_)));
}

#[test]
fn global_extern_conflict_is_an_error() {
    let err = assemble_err(vec![
        dir(Directive::Global(vec!["x".into()])),
        dir(Directive::Extern(vec!["x".into()])),
    ]);
    assert!(matches!(err, AsmErrorKind::GlobalExternConflict(_)));

    let err = assemble_err(vec![
        dir(Directive::Extern(vec!["x".into()])),
        dir(Directive::Global(vec!["x".into()])),
    ]);
    assert!(matches!(err, AsmErrorKind::GlobalExternConflict(_)));
}

#[test]
fn global_before_or_after_label_promotes_it() {
    for items in [
        vec![
            dir(Directive::Global(vec!["main".into()])),
            org(0x2000),
            label("main"),
            instr(Mnemonic::Nop, vec![]),
        ],
        vec![
            org(0x2000),
            label("main"),
            instr(Mnemonic::Nop, vec![]),
            dir(Directive::Global(vec!["main".into()])),
        ],
    ] {
        let obj = assemble(items);
        let main = &obj.symbols()[obj.find_symbol("main").unwrap()];
        assert_eq!(main.binding, SymbolBinding::Global);
        assert!(obj.flags().contains(ObjectFlags::HAS_ENTRY));
    }
}

#[test]
fn variables_participate_in_expressions() {
    let obj = assemble(vec![
        dir(Directive::Const {
            name: "BASE".into(),
            value: Expr::int(0x40),
        }),
        dir(Directive::Let {
            name: "n".into(),
            value: Expr::int(2),
        }),
        dir(Directive::Assign {
            name: "n".into(),
            op: AssignOp::Add,
            value: Expr::int(3),
        }),
        org(0x2000),
        instr(
            Mnemonic::Ld,
            vec![
                Operand::Register(RegId::L0),
                Operand::Immediate(Expr::add(Expr::var("BASE"), Expr::var("n"))),
            ],
        ),
    ]);
    assert_eq!(obj.sections()[0].data, vec![0x10, 0x00, 0x45]);
}

#[test]
fn const_reassignment_is_an_error() {
    let err = assemble_err(vec![
        dir(Directive::Const {
            name: "K".into(),
            value: Expr::int(1),
        }),
        dir(Directive::Assign {
            name: "K".into(),
            op: AssignOp::Set,
            value: Expr::int(2),
        }),
    ]);
    assert!(matches!(err, AsmErrorKind::ConstReassignment(_)));
}

#[test]
fn conditional_branches_encode_their_condition() {
    let obj = assemble(vec![
        org(0x2000),
        instr(
            Mnemonic::Jmp,
            vec![
                Operand::Condition(Cond::CSet),
                Operand::Immediate(Expr::int(0x3000)),
            ],
        ),
        instr(Mnemonic::Ret, vec![Operand::Condition(Cond::ZClear)]),
    ]);
    let data = &obj.sections()[0].data;
    assert_eq!(&data[..2], &[0x40, 0x30]); // condition in the X nibble
    assert_eq!(&data[6..], &[0x45, 0x20]);
}

#[test]
fn int_instruction_encodes_the_vector_verbatim() {
    let obj = assemble(vec![
        org(0x2000),
        instr(Mnemonic::Int, vec![imm(31)]),
    ]);
    assert_eq!(obj.sections()[0].data, vec![0x44, 0x1F]);

    let err = assemble_err(vec![
        org(0x2000),
        instr(Mnemonic::Int, vec![imm(32)]),
    ]);
    assert!(matches!(err, AsmErrorKind::VectorOutOfRange(32)));
}

#[test]
fn aliases_assemble_like_their_targets() {
    let tcf = assemble(vec![org(0x2000), instr(Mnemonic::Tcf, vec![])]);
    let ccf = assemble(vec![org(0x2000), instr(Mnemonic::Ccf, vec![])]);
    assert_eq!(tcf.sections()[0].data, ccf.sections()[0].data);

    let cpl = assemble(vec![org(0x2000), instr(Mnemonic::Cpl, vec![])]);
    assert_eq!(cpl.sections()[0].data, vec![0x79, 0x00]); // NOT l0
}

#[test]
fn accumulator_restriction_is_enforced() {
    let err = assemble_err(vec![
        org(0x2000),
        instr(
            Mnemonic::Add,
            vec![Operand::Register(RegId::l(1)), imm(1)],
        ),
    ]);
    assert!(matches!(err, AsmErrorKind::OperandTypeMismatch { .. }));
}

#[test]
fn word_data_with_extern_emits_abs16() {
    let obj = assemble(vec![
        dir(Directive::Extern(vec!["sym".into()])),
        org(0x2000),
        dir(Directive::Word(vec![Expr::ident("sym"), Expr::int(7)])),
    ]);
    assert_eq!(obj.sections()[0].data, vec![0, 0, 7, 0]);
    assert_eq!(obj.relocations()[0].kind, RelocKind::Abs16);
    assert_eq!(obj.relocations()[0].offset, 0);
}
