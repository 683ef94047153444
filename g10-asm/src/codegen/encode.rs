//! Instruction form selection.
//!
//! One routine maps an AST instruction to its opcode word and immediate
//! slot. The address pass takes only the encoded length from the result
//! and the emission pass takes the bytes, so the two can never disagree
//! about an instruction's size.

use g10_isa::{form, Cond, Mnemonic, OpWord, RegClass, RegId};

use crate::ast::{Expr, Instruction, Operand};
use crate::diag::{AsmError, AsmErrorKind};

/// The immediate slot an instruction form carries after its opcode word.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ImmSlot<'a> {
    None,
    /// 8-bit immediate value.
    Abs8(&'a Expr),
    /// 16-bit immediate value.
    Abs16(&'a Expr),
    /// 32-bit immediate value or absolute address.
    Abs32(&'a Expr),
    /// 16-bit address inside the Quick window.
    Quick16(&'a Expr),
    /// 8-bit address inside the Port window.
    Port8(&'a Expr),
    /// 16-bit signed PC-relative branch offset.
    Rel16(&'a Expr),
}

impl ImmSlot<'_> {
    /// Immediate width in bytes.
    pub(crate) fn width(&self) -> u32 {
        match self {
            ImmSlot::None => 0,
            ImmSlot::Abs8(_) | ImmSlot::Port8(_) => 1,
            ImmSlot::Abs16(_) | ImmSlot::Quick16(_) | ImmSlot::Rel16(_) => 2,
            ImmSlot::Abs32(_) => 4,
        }
    }
}

/// A value evaluated at emission time and folded into the opcode word
/// itself rather than an immediate slot.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OpPatch<'a> {
    None,
    /// Bit index for `BIT`/`SET`/`RES`/`TOG`, emitted in the Y nibble.
    BitIndex(&'a Expr),
    /// Interrupt vector for `INT`, emitted as the whole operand byte.
    IntVector(&'a Expr),
}

/// A fully selected instruction encoding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstrForm<'a> {
    pub op: OpWord,
    pub patch: OpPatch<'a>,
    pub imm: ImmSlot<'a>,
}

impl<'a> InstrForm<'a> {
    /// Total encoded length: opcode word plus immediate.
    pub(crate) fn encoded_len(&self) -> u32 {
        2 + self.imm.width()
    }

    fn bare(op: OpWord) -> InstrForm<'a> {
        InstrForm {
            op,
            patch: OpPatch::None,
            imm: ImmSlot::None,
        }
    }

    fn with_imm(op: OpWord, imm: ImmSlot<'a>) -> InstrForm<'a> {
        InstrForm {
            op,
            patch: OpPatch::None,
            imm,
        }
    }
}

fn mismatch(instr: &Instruction, detail: impl Into<String>) -> AsmError {
    AsmErrorKind::OperandTypeMismatch {
        mnemonic: instr.mnemonic.to_string(),
        detail: detail.into(),
    }
    .at(instr.loc.clone())
}

/// Split a leading condition-code operand off the operand list.
fn split_cond(operands: &[Operand]) -> (Cond, &[Operand]) {
    match operands.first() {
        Some(Operand::Condition(cond)) => (*cond, &operands[1..]),
        _ => (Cond::None, operands),
    }
}

/// Select the encoding for `instr`, validating operand shapes.
pub(crate) fn select_form(instr: &Instruction) -> Result<InstrForm<'_>, AsmError> {
    use Mnemonic::*;

    let ops = instr.operands.as_slice();
    match instr.mnemonic.canonical() {
        Nop => zero_operand(instr, form::NOP),
        Stop => zero_operand(instr, form::STOP),
        Halt => zero_operand(instr, form::HALT),
        Di => zero_operand(instr, form::DI),
        Ei => zero_operand(instr, form::EI),
        Eii => zero_operand(instr, form::EII),
        Daa => zero_operand(instr, form::DAA),
        Scf => zero_operand(instr, form::SCF),
        Ccf => zero_operand(instr, form::CCF),
        Clv => zero_operand(instr, form::CLV),
        Sev => zero_operand(instr, form::SEV),
        Reti => zero_operand(instr, form::RETI),
        Cpl => {
            if !ops.is_empty() {
                return Err(mismatch(instr, "takes no operands"));
            }
            Ok(InstrForm::bare(OpWord::new(form::NOT_L, 0, 0)))
        }

        Ld => select_load(instr, ops),
        Ldq => select_load(instr, ops),
        Ldp => select_load(instr, ops),
        St => select_store(instr, ops),
        Stq => select_store(instr, ops),
        Stp => select_store(instr, ops),
        Mv => select_move(instr, ops),
        Mwh => {
            let (dst, src) = two_registers(instr, ops)?;
            match (dst.class(), src.class()) {
                (RegClass::Dword, RegClass::Word) => Ok(InstrForm::bare(
                    OpWord::new(form::MWH, dst.index(), src.index()),
                )),
                _ => Err(mismatch(instr, "expects a D destination and W source")),
            }
        }
        Mwl => {
            let (dst, src) = two_registers(instr, ops)?;
            match (dst.class(), src.class()) {
                (RegClass::Word, RegClass::Dword) => Ok(InstrForm::bare(
                    OpWord::new(form::MWL, dst.index(), src.index()),
                )),
                _ => Err(mismatch(instr, "expects a W destination and D source")),
            }
        }

        Lsp => match ops {
            [Operand::Immediate(expr)] => Ok(InstrForm::with_imm(
                OpWord::new(form::LSP, 0, 0),
                ImmSlot::Abs32(expr),
            )),
            _ => Err(mismatch(instr, "expects a 32-bit immediate")),
        },
        Ssp => match ops {
            [Operand::Direct(expr)] => Ok(InstrForm::with_imm(
                OpWord::new(form::SSP, 0, 0),
                ImmSlot::Abs32(expr),
            )),
            _ => Err(mismatch(instr, "expects a direct address")),
        },
        Pop => {
            let reg = single_register(instr, ops, RegClass::Dword)?;
            Ok(InstrForm::bare(OpWord::new(form::POP, reg.index(), 0)))
        }
        Push => {
            let reg = single_register(instr, ops, RegClass::Dword)?;
            Ok(InstrForm::bare(OpWord::new(form::PUSH, reg.index(), 0)))
        }
        Spo => {
            let reg = single_register(instr, ops, RegClass::Dword)?;
            Ok(InstrForm::bare(OpWord::new(form::SPO, reg.index(), 0)))
        }
        Spi => {
            let reg = single_register(instr, ops, RegClass::Dword)?;
            Ok(InstrForm::bare(OpWord::new(form::SPI, 0, reg.index())))
        }

        Jmp => {
            let (cond, rest) = split_cond(ops);
            match rest {
                [Operand::Immediate(expr)] => Ok(InstrForm::with_imm(
                    OpWord::new(form::JMP_IMM32, cond.encode(), 0),
                    ImmSlot::Abs32(expr),
                )),
                [Operand::Register(reg)]
                    if reg.class() == RegClass::Dword =>
                {
                    Ok(InstrForm::bare(OpWord::new(
                        form::JMP_IND_D,
                        cond.encode(),
                        reg.index(),
                    )))
                }
                _ => Err(mismatch(
                    instr,
                    "expects an address or a D register target",
                )),
            }
        }
        Jpb => {
            let (cond, rest) = split_cond(ops);
            match rest {
                [Operand::Immediate(expr)] => Ok(InstrForm::with_imm(
                    OpWord::new(form::JPB, cond.encode(), 0),
                    ImmSlot::Rel16(expr),
                )),
                _ => Err(mismatch(instr, "expects a relative target")),
            }
        }
        Call => {
            let (cond, rest) = split_cond(ops);
            match rest {
                [Operand::Immediate(expr)] => Ok(InstrForm::with_imm(
                    OpWord::new(form::CALL, cond.encode(), 0),
                    ImmSlot::Abs32(expr),
                )),
                _ => Err(mismatch(instr, "expects an address target")),
            }
        }
        Int => match ops {
            [Operand::Immediate(expr)] => Ok(InstrForm {
                op: OpWord::new(form::INT, 0, 0),
                patch: OpPatch::IntVector(expr),
                imm: ImmSlot::None,
            }),
            _ => Err(mismatch(instr, "expects a vector number")),
        },
        Ret => {
            let (cond, rest) = split_cond(ops);
            if !rest.is_empty() {
                return Err(mismatch(instr, "takes only a condition"));
            }
            Ok(InstrForm::bare(OpWord::new(form::RET, cond.encode(), 0)))
        }

        Add => select_acc_arith(
            instr,
            ops,
            AccForms {
                imm8: form::ADD_IMM8,
                reg8: form::ADD_L,
                ind8: form::ADD_IND_D,
                imm16: Some(form::ADD_W_IMM16),
                reg16: Some(form::ADD_W_W),
                imm32: Some(form::ADD_D_IMM32),
                reg32: Some(form::ADD_D_D),
            },
        ),
        Sub => select_acc_arith(
            instr,
            ops,
            AccForms {
                imm8: form::SUB_IMM8,
                reg8: form::SUB_L,
                ind8: form::SUB_IND_D,
                imm16: Some(form::SUB_W_IMM16),
                reg16: Some(form::SUB_W_W),
                imm32: Some(form::SUB_D_IMM32),
                reg32: Some(form::SUB_D_D),
            },
        ),
        Adc => select_acc_arith(
            instr,
            ops,
            AccForms {
                imm8: form::ADC_IMM8,
                reg8: form::ADC_L,
                ind8: form::ADC_IND_D,
                imm16: None,
                reg16: None,
                imm32: None,
                reg32: None,
            },
        ),
        Sbc => select_acc_arith(
            instr,
            ops,
            AccForms {
                imm8: form::SBC_IMM8,
                reg8: form::SBC_L,
                ind8: form::SBC_IND_D,
                imm16: None,
                reg16: None,
                imm32: None,
                reg32: None,
            },
        ),
        And => select_acc_logic(instr, ops, form::AND_IMM8, form::AND_L, form::AND_IND_D),
        Or => select_acc_logic(instr, ops, form::OR_IMM8, form::OR_L, form::OR_IND_D),
        Xor => select_acc_logic(instr, ops, form::XOR_IMM8, form::XOR_L, form::XOR_IND_D),
        Cmp => select_acc_logic(instr, ops, form::CMP_IMM8, form::CMP_L, form::CMP_IND_D),

        Inc => select_step(instr, ops, form::INC_L, form::INC_W, form::INC_D, form::INC_IND_D),
        Dec => select_step(instr, ops, form::DEC_L, form::DEC_W, form::DEC_D, form::DEC_IND_D),

        Not => select_byte_unary(instr, ops, form::NOT_L, form::NOT_IND_D),
        Sla => select_byte_unary(instr, ops, form::SLA_L, form::SLA_IND_D),
        Sra => select_byte_unary(instr, ops, form::SRA_L, form::SRA_IND_D),
        Srl => select_byte_unary(instr, ops, form::SRL_L, form::SRL_IND_D),
        Rl => select_byte_unary(instr, ops, form::RL_L, form::RL_IND_D),
        Rlc => select_byte_unary(instr, ops, form::RLC_L, form::RLC_IND_D),
        Rr => select_byte_unary(instr, ops, form::RR_L, form::RR_IND_D),
        Rrc => select_byte_unary(instr, ops, form::RRC_L, form::RRC_IND_D),
        Rla => zero_operand(instr, form::RLA),
        Rlca => zero_operand(instr, form::RLCA),
        Rra => zero_operand(instr, form::RRA),
        Rrca => zero_operand(instr, form::RRCA),

        Swap => match ops {
            [Operand::Register(reg)] => {
                let byte = match reg.class() {
                    RegClass::Byte => form::SWAP_L,
                    RegClass::Word => form::SWAP_W,
                    RegClass::Dword => form::SWAP_D,
                    RegClass::Special => {
                        return Err(mismatch(instr, "cannot swap a special register"))
                    }
                };
                Ok(InstrForm::bare(OpWord::new(byte, reg.index(), 0)))
            }
            [Operand::Indirect(reg)] if reg.class() == RegClass::Dword => {
                Ok(InstrForm::bare(OpWord::new(
                    form::SWAP_IND_D,
                    reg.index(),
                    0,
                )))
            }
            _ => Err(mismatch(instr, "expects a register or [D] target")),
        },

        Bit => select_bit(instr, ops, form::BIT_L, form::BIT_IND_D),
        Set => select_bit(instr, ops, form::SET_L, form::SET_IND_D),
        Res => select_bit(instr, ops, form::RES_L, form::RES_IND_D),
        Tog => select_bit(instr, ops, form::TOG_L, form::TOG_IND_D),

        // Aliases are resolved by canonical() above.
        Tcf | Jp | Jr | Cp => unreachable!("aliases resolve to their target"),
    }
}

fn zero_operand<'a>(
    instr: &'a Instruction,
    byte: u8,
) -> Result<InstrForm<'a>, AsmError> {
    if !instr.operands.is_empty() {
        return Err(mismatch(instr, "takes no operands"));
    }
    Ok(InstrForm::bare(OpWord::new(byte, 0, 0)))
}

fn two_registers(
    instr: &Instruction,
    ops: &[Operand],
) -> Result<(RegId, RegId), AsmError> {
    match ops {
        [Operand::Register(dst), Operand::Register(src)] => Ok((*dst, *src)),
        _ => Err(mismatch(instr, "expects two registers")),
    }
}

fn single_register(
    instr: &Instruction,
    ops: &[Operand],
    class: RegClass,
) -> Result<RegId, AsmError> {
    match ops {
        [Operand::Register(reg)] if reg.class() == class => Ok(*reg),
        _ => Err(mismatch(instr, "expects one D register")),
    }
}

fn select_load<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
) -> Result<InstrForm<'a>, AsmError> {
    let [Operand::Register(dst), src] = ops else {
        return Err(mismatch(instr, "expects a register destination and a source"));
    };
    let class = dst.class();
    let x = dst.index();
    let quick = instr.mnemonic.canonical() == Mnemonic::Ldq;
    let port = instr.mnemonic.canonical() == Mnemonic::Ldp;

    if port && class != RegClass::Byte {
        return Err(mismatch(instr, "port loads are byte-wide only"));
    }

    match src {
        Operand::Immediate(expr) if !quick && !port => {
            let (byte, imm) = match class {
                RegClass::Byte => (form::LD_L_IMM8, ImmSlot::Abs8(expr)),
                RegClass::Word => (form::LD_W_IMM16, ImmSlot::Abs16(expr)),
                RegClass::Dword => (form::LD_D_IMM32, ImmSlot::Abs32(expr)),
                RegClass::Special => {
                    return Err(mismatch(instr, "cannot load a special register"))
                }
            };
            Ok(InstrForm::with_imm(OpWord::new(byte, x, 0), imm))
        }
        Operand::Direct(expr) => {
            let (byte, imm) = match (quick, port, class) {
                (false, false, RegClass::Byte) => {
                    (form::LD_L_ADDR32, ImmSlot::Abs32(expr))
                }
                (false, false, RegClass::Word) => {
                    (form::LD_W_ADDR32, ImmSlot::Abs32(expr))
                }
                (false, false, RegClass::Dword) => {
                    (form::LD_D_ADDR32, ImmSlot::Abs32(expr))
                }
                (true, false, RegClass::Byte) => {
                    (form::LDQ_L_ADDR16, ImmSlot::Quick16(expr))
                }
                (true, false, RegClass::Word) => {
                    (form::LDQ_W_ADDR16, ImmSlot::Quick16(expr))
                }
                (true, false, RegClass::Dword) => {
                    (form::LDQ_D_ADDR16, ImmSlot::Quick16(expr))
                }
                (false, true, RegClass::Byte) => {
                    (form::LDP_L_ADDR8, ImmSlot::Port8(expr))
                }
                _ => return Err(mismatch(instr, "unsupported destination width")),
            };
            Ok(InstrForm::with_imm(OpWord::new(byte, x, 0), imm))
        }
        Operand::Indirect(base) => {
            let byte = match (quick, port, class, base.class()) {
                (false, false, RegClass::Byte, RegClass::Dword) => form::LD_L_IND_D,
                (false, false, RegClass::Word, RegClass::Dword) => form::LD_W_IND_D,
                (false, false, RegClass::Dword, RegClass::Dword) => form::LD_D_IND_D,
                (true, false, RegClass::Byte, RegClass::Word) => form::LDQ_L_IND_W,
                (true, false, RegClass::Word, RegClass::Word) => form::LDQ_W_IND_W,
                (true, false, RegClass::Dword, RegClass::Word) => form::LDQ_D_IND_W,
                (false, true, RegClass::Byte, RegClass::Byte) => form::LDP_L_IND_L,
                _ => {
                    return Err(mismatch(
                        instr,
                        "indirect base register does not fit the addressing mode",
                    ))
                }
            };
            Ok(InstrForm::bare(OpWord::new(byte, x, base.index())))
        }
        _ => Err(mismatch(instr, "unsupported source operand")),
    }
}

fn select_store<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
) -> Result<InstrForm<'a>, AsmError> {
    let [dst, Operand::Register(src)] = ops else {
        return Err(mismatch(instr, "expects a destination and a register source"));
    };
    let class = src.class();
    let y = src.index();
    let quick = instr.mnemonic.canonical() == Mnemonic::Stq;
    let port = instr.mnemonic.canonical() == Mnemonic::Stp;

    if port && class != RegClass::Byte {
        return Err(mismatch(instr, "port stores are byte-wide only"));
    }

    match dst {
        Operand::Direct(expr) => {
            let (byte, imm) = match (quick, port, class) {
                (false, false, RegClass::Byte) => {
                    (form::ST_ADDR32_L, ImmSlot::Abs32(expr))
                }
                (false, false, RegClass::Word) => {
                    (form::ST_ADDR32_W, ImmSlot::Abs32(expr))
                }
                (false, false, RegClass::Dword) => {
                    (form::ST_ADDR32_D, ImmSlot::Abs32(expr))
                }
                (true, false, RegClass::Byte) => {
                    (form::STQ_ADDR16_L, ImmSlot::Quick16(expr))
                }
                (true, false, RegClass::Word) => {
                    (form::STQ_ADDR16_W, ImmSlot::Quick16(expr))
                }
                (true, false, RegClass::Dword) => {
                    (form::STQ_ADDR16_D, ImmSlot::Quick16(expr))
                }
                (false, true, RegClass::Byte) => {
                    (form::STP_ADDR8_L, ImmSlot::Port8(expr))
                }
                _ => return Err(mismatch(instr, "unsupported source width")),
            };
            Ok(InstrForm::with_imm(OpWord::new(byte, 0, y), imm))
        }
        Operand::Indirect(base) => {
            let byte = match (quick, port, class, base.class()) {
                (false, false, RegClass::Byte, RegClass::Dword) => form::ST_IND_D_L,
                (false, false, RegClass::Word, RegClass::Dword) => form::ST_IND_D_W,
                (false, false, RegClass::Dword, RegClass::Dword) => form::ST_IND_D_D,
                (true, false, RegClass::Byte, RegClass::Word) => form::STQ_IND_W_L,
                (true, false, RegClass::Word, RegClass::Word) => form::STQ_IND_W_W,
                (true, false, RegClass::Dword, RegClass::Word) => form::STQ_IND_W_D,
                (false, true, RegClass::Byte, RegClass::Byte) => form::STP_IND_L_L,
                _ => {
                    return Err(mismatch(
                        instr,
                        "indirect base register does not fit the addressing mode",
                    ))
                }
            };
            Ok(InstrForm::bare(OpWord::new(byte, base.index(), y)))
        }
        _ => Err(mismatch(instr, "unsupported destination operand")),
    }
}

fn select_move<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
) -> Result<InstrForm<'a>, AsmError> {
    let (dst, src) = two_registers(instr, ops)?;
    use g10_isa::RegView;
    let byte = match (dst.view(), src.view()) {
        (RegView::LowByte(_), RegView::LowByte(_)) => form::MV_L_L,
        (RegView::HighByte(_), RegView::LowByte(_)) => form::MV_H_L,
        (RegView::LowByte(_), RegView::HighByte(_)) => form::MV_L_H,
        (RegView::Word(_), RegView::Word(_)) => form::MV_W_W,
        (RegView::Dword(_), RegView::Dword(_)) => form::MV_D_D,
        _ => return Err(mismatch(instr, "unsupported register pairing")),
    };
    Ok(InstrForm::bare(OpWord::new(byte, dst.index(), src.index())))
}

struct AccForms {
    imm8: u8,
    reg8: u8,
    ind8: u8,
    imm16: Option<u8>,
    reg16: Option<u8>,
    imm32: Option<u8>,
    reg32: Option<u8>,
}

fn select_acc_arith<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
    forms: AccForms,
) -> Result<InstrForm<'a>, AsmError> {
    let [Operand::Register(acc), src] = ops else {
        return Err(mismatch(instr, "expects an accumulator and a source"));
    };
    if !acc.is_accumulator() {
        return Err(mismatch(instr, "destination must be l0, w0 or d0"));
    }

    match (acc.class(), src) {
        (RegClass::Byte, Operand::Immediate(expr)) => Ok(InstrForm::with_imm(
            OpWord::new(forms.imm8, 0, 0),
            ImmSlot::Abs8(expr),
        )),
        (RegClass::Byte, Operand::Register(reg))
            if reg.class() == RegClass::Byte =>
        {
            Ok(InstrForm::bare(OpWord::new(forms.reg8, 0, reg.index())))
        }
        (RegClass::Byte, Operand::Indirect(base))
            if base.class() == RegClass::Dword =>
        {
            Ok(InstrForm::bare(OpWord::new(forms.ind8, 0, base.index())))
        }
        (RegClass::Word, Operand::Immediate(expr)) => {
            let byte = forms
                .imm16
                .ok_or_else(|| mismatch(instr, "has no 16-bit form"))?;
            Ok(InstrForm::with_imm(
                OpWord::new(byte, 0, 0),
                ImmSlot::Abs16(expr),
            ))
        }
        (RegClass::Word, Operand::Register(reg))
            if reg.class() == RegClass::Word =>
        {
            let byte = forms
                .reg16
                .ok_or_else(|| mismatch(instr, "has no 16-bit form"))?;
            Ok(InstrForm::bare(OpWord::new(byte, 0, reg.index())))
        }
        (RegClass::Dword, Operand::Immediate(expr)) => {
            let byte = forms
                .imm32
                .ok_or_else(|| mismatch(instr, "has no 32-bit form"))?;
            Ok(InstrForm::with_imm(
                OpWord::new(byte, 0, 0),
                ImmSlot::Abs32(expr),
            ))
        }
        (RegClass::Dword, Operand::Register(reg))
            if reg.class() == RegClass::Dword =>
        {
            let byte = forms
                .reg32
                .ok_or_else(|| mismatch(instr, "has no 32-bit form"))?;
            Ok(InstrForm::bare(OpWord::new(byte, 0, reg.index())))
        }
        _ => Err(mismatch(instr, "unsupported operand combination")),
    }
}

fn select_acc_logic<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
    imm8: u8,
    reg8: u8,
    ind8: u8,
) -> Result<InstrForm<'a>, AsmError> {
    let [Operand::Register(acc), src] = ops else {
        return Err(mismatch(instr, "expects an accumulator and a source"));
    };
    if *acc != RegId::L0 {
        return Err(mismatch(instr, "destination must be l0"));
    }
    match src {
        Operand::Immediate(expr) => Ok(InstrForm::with_imm(
            OpWord::new(imm8, 0, 0),
            ImmSlot::Abs8(expr),
        )),
        Operand::Register(reg) if reg.class() == RegClass::Byte => {
            Ok(InstrForm::bare(OpWord::new(reg8, 0, reg.index())))
        }
        Operand::Indirect(base) if base.class() == RegClass::Dword => {
            Ok(InstrForm::bare(OpWord::new(ind8, 0, base.index())))
        }
        _ => Err(mismatch(instr, "unsupported source operand")),
    }
}

fn select_step<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
    byte8: u8,
    byte16: u8,
    byte32: u8,
    indirect: u8,
) -> Result<InstrForm<'a>, AsmError> {
    match ops {
        [Operand::Register(reg)] => {
            let byte = match reg.class() {
                RegClass::Byte => byte8,
                RegClass::Word => byte16,
                RegClass::Dword => byte32,
                RegClass::Special => {
                    return Err(mismatch(instr, "cannot step a special register"))
                }
            };
            Ok(InstrForm::bare(OpWord::new(byte, reg.index(), 0)))
        }
        [Operand::Indirect(base)] if base.class() == RegClass::Dword => {
            Ok(InstrForm::bare(OpWord::new(indirect, base.index(), 0)))
        }
        _ => Err(mismatch(instr, "expects a register or [D] target")),
    }
}

fn select_byte_unary<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
    reg_form: u8,
    ind_form: u8,
) -> Result<InstrForm<'a>, AsmError> {
    match ops {
        [Operand::Register(reg)] if reg.class() == RegClass::Byte => {
            Ok(InstrForm::bare(OpWord::new(reg_form, reg.index(), 0)))
        }
        [Operand::Indirect(base)] if base.class() == RegClass::Dword => {
            Ok(InstrForm::bare(OpWord::new(ind_form, base.index(), 0)))
        }
        _ => Err(mismatch(instr, "expects an L register or [D] target")),
    }
}

fn select_bit<'a>(
    instr: &'a Instruction,
    ops: &'a [Operand],
    reg_form: u8,
    ind_form: u8,
) -> Result<InstrForm<'a>, AsmError> {
    let [Operand::Immediate(bit), target] = ops else {
        return Err(mismatch(instr, "expects a bit index and a target"));
    };
    match target {
        Operand::Register(reg) if reg.class() == RegClass::Byte => {
            Ok(InstrForm {
                op: OpWord::new(reg_form, reg.index(), 0),
                patch: OpPatch::BitIndex(bit),
                imm: ImmSlot::None,
            })
        }
        Operand::Indirect(base) if base.class() == RegClass::Dword => {
            Ok(InstrForm {
                op: OpWord::new(ind_form, base.index(), 0),
                patch: OpPatch::BitIndex(bit),
                imm: ImmSlot::None,
            })
        }
        _ => Err(mismatch(instr, "expects an L register or [D] target")),
    }
}
