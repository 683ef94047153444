//! Instruction decode and execution.
//!
//! The opcode word has already been fetched; `execute` selects on the form
//! byte, fetches whatever immediate the form needs, and performs the
//! semantic step. Memory and cycle accounting happen inside the access
//! helpers, so the cost of an instruction is exactly the traffic it causes
//! plus the fixed surcharges consumed explicitly here.

use g10_isa::{form, ExceptionCode, Flags, RegId, PORT_BASE, QUICK_BASE};

use crate::alu;
use crate::cpu::Step;
use crate::{Bus, Cpu};

impl<B: Bus> Cpu<B> {
    pub(crate) fn execute(&mut self) -> Step {
        let x = self.opcode.x();
        let y = self.opcode.y();

        match self.opcode.form() {
            /* Control ****************************************************/
            form::NOP => Ok(()),
            form::STOP => self.enter_stop_state(),
            form::HALT => {
                self.enter_halt_state();
                Ok(())
            }
            form::DI => {
                self.disable_interrupts();
                Ok(())
            }
            form::EI => {
                self.enable_interrupts(false);
                Ok(())
            }
            form::EII => {
                self.enable_interrupts(true);
                Ok(())
            }
            form::DAA => {
                let l0 = self.read_reg(RegId::L0) as u8;
                let result = alu::daa(l0, &mut self.regs.flags);
                self.write_reg(RegId::L0, result.into());
                Ok(())
            }
            form::SCF => {
                let flags = &mut self.regs.flags;
                flags.set(Flags::C, true);
                flags.set(Flags::N, false);
                flags.set(Flags::H, false);
                Ok(())
            }
            form::CCF => {
                let flags = &mut self.regs.flags;
                let carry = flags.carry();
                flags.set(Flags::C, !carry);
                flags.set(Flags::N, false);
                flags.set(Flags::H, false);
                Ok(())
            }
            form::CLV => {
                self.regs.flags.set(Flags::V, false);
                Ok(())
            }
            form::SEV => {
                self.regs.flags.set(Flags::V, true);
                Ok(())
            }

            /* 8-bit load/store/move **************************************/
            form::LD_L_IMM8 => {
                let imm = self.fetch_imm8()?;
                self.write_reg(RegId::l(x), imm.into());
                Ok(())
            }
            form::LD_L_ADDR32 => {
                let addr = self.fetch_imm32()?;
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::LD_L_IND_D => {
                let addr = self.read_reg(RegId::d(y));
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::LDQ_L_ADDR16 => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::LDQ_L_IND_W => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(y));
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::LDP_L_ADDR8 => {
                let addr = PORT_BASE | u32::from(self.fetch_imm8()?);
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::LDP_L_IND_L => {
                let addr = PORT_BASE | self.read_reg(RegId::l(y));
                let value = self.read_byte(addr)?;
                self.write_reg(RegId::l(x), value.into());
                Ok(())
            }
            form::ST_ADDR32_L => {
                let addr = self.fetch_imm32()?;
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::ST_IND_D_L => {
                let addr = self.read_reg(RegId::d(x));
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::STQ_ADDR16_L => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::STQ_IND_W_L => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(x));
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::STP_ADDR8_L => {
                let addr = PORT_BASE | u32::from(self.fetch_imm8()?);
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::STP_IND_L_L => {
                let addr = PORT_BASE | self.read_reg(RegId::l(x));
                let value = self.read_reg(RegId::l(y)) as u8;
                self.write_byte(addr, value)
            }
            form::MV_L_L => {
                let value = self.read_reg(RegId::l(y));
                self.write_reg(RegId::l(x), value);
                Ok(())
            }
            form::MV_H_L => {
                let value = self.read_reg(RegId::l(y));
                self.write_reg(RegId::h(x), value);
                Ok(())
            }
            form::MV_L_H => {
                let value = self.read_reg(RegId::h(y));
                self.write_reg(RegId::l(x), value);
                Ok(())
            }

            /* 16-bit load/store/move *************************************/
            form::LD_W_IMM16 => {
                let imm = self.fetch_imm16()?;
                self.write_reg(RegId::w(x), imm.into());
                Ok(())
            }
            form::LD_W_ADDR32 => {
                let addr = self.fetch_imm32()?;
                let value = self.read_word(addr)?;
                self.write_reg(RegId::w(x), value.into());
                Ok(())
            }
            form::LD_W_IND_D => {
                let addr = self.read_reg(RegId::d(y));
                let value = self.read_word(addr)?;
                self.write_reg(RegId::w(x), value.into());
                Ok(())
            }
            form::LDQ_W_ADDR16 => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_word(addr)?;
                self.write_reg(RegId::w(x), value.into());
                Ok(())
            }
            form::LDQ_W_IND_W => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(y));
                let value = self.read_word(addr)?;
                self.write_reg(RegId::w(x), value.into());
                Ok(())
            }
            form::ST_ADDR32_W => {
                let addr = self.fetch_imm32()?;
                let value = self.read_reg(RegId::w(y)) as u16;
                self.write_word(addr, value)
            }
            form::ST_IND_D_W => {
                let addr = self.read_reg(RegId::d(x));
                let value = self.read_reg(RegId::w(y)) as u16;
                self.write_word(addr, value)
            }
            form::STQ_ADDR16_W => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_reg(RegId::w(y)) as u16;
                self.write_word(addr, value)
            }
            form::STQ_IND_W_W => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(x));
                let value = self.read_reg(RegId::w(y)) as u16;
                self.write_word(addr, value)
            }
            form::MV_W_W => {
                let value = self.read_reg(RegId::w(y));
                self.write_reg(RegId::w(x), value);
                Ok(())
            }
            form::MWH => {
                // Source word becomes the high half of DX.
                let dest = RegId::d(x);
                let word = self.read_reg(RegId::w(y));
                let value = (self.read_reg(dest) & 0x0000_FFFF) | (word << 16);
                self.write_reg(dest, value);
                Ok(())
            }
            form::MWL => {
                // High half of DY becomes WX.
                let value = self.read_reg(RegId::d(y)) >> 16;
                self.write_reg(RegId::w(x), value);
                Ok(())
            }

            /* 32-bit load/store/move and stack ***************************/
            form::LD_D_IMM32 => {
                let imm = self.fetch_imm32()?;
                self.write_reg(RegId::d(x), imm);
                Ok(())
            }
            form::LD_D_ADDR32 => {
                let addr = self.fetch_imm32()?;
                let value = self.read_dword(addr)?;
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::LD_D_IND_D => {
                let addr = self.read_reg(RegId::d(y));
                let value = self.read_dword(addr)?;
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::LDQ_D_ADDR16 => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_dword(addr)?;
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::LDQ_D_IND_W => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(y));
                let value = self.read_dword(addr)?;
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::LSP => {
                let value = self.fetch_imm32()?;
                self.regs.sp = value;
                self.consume_machine_cycles(1)
            }
            form::POP => {
                let value = self.pop_dword()?;
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::ST_ADDR32_D => {
                let addr = self.fetch_imm32()?;
                let value = self.read_reg(RegId::d(y));
                self.write_dword(addr, value)
            }
            form::ST_IND_D_D => {
                let addr = self.read_reg(RegId::d(x));
                let value = self.read_reg(RegId::d(y));
                self.write_dword(addr, value)
            }
            form::STQ_ADDR16_D => {
                let addr = QUICK_BASE | u32::from(self.fetch_imm16()?);
                let value = self.read_reg(RegId::d(y));
                self.write_dword(addr, value)
            }
            form::STQ_IND_W_D => {
                let addr = QUICK_BASE | self.read_reg(RegId::w(x));
                let value = self.read_reg(RegId::d(y));
                self.write_dword(addr, value)
            }
            form::SSP => {
                let addr = self.fetch_imm32()?;
                let sp = self.regs.sp;
                self.write_dword(addr, sp)
            }
            form::PUSH => {
                let value = self.read_reg(RegId::d(x));
                self.push_dword(value)
            }
            form::MV_D_D => {
                let value = self.read_reg(RegId::d(y));
                self.write_reg(RegId::d(x), value);
                Ok(())
            }
            form::SPO => {
                let sp = self.regs.sp;
                self.write_reg(RegId::d(x), sp);
                Ok(())
            }
            form::SPI => {
                self.regs.sp = self.read_reg(RegId::d(y));
                self.consume_machine_cycles(1)
            }

            /* Branches ***************************************************/
            form::JMP_IMM32 => {
                let target = self.fetch_imm32()?;
                if self.branch_condition()? {
                    self.regs.pc = target;
                    self.consume_machine_cycles(1)?;
                }
                Ok(())
            }
            form::JMP_IND_D => {
                if self.branch_condition()? {
                    self.regs.pc = self.read_reg(RegId::d(y));
                    self.consume_machine_cycles(1)?;
                }
                Ok(())
            }
            form::JPB => {
                let offset = self.fetch_imm16()? as i16;
                if self.branch_condition()? {
                    self.regs.pc =
                        self.regs.pc.wrapping_add_signed(i32::from(offset));
                    self.consume_machine_cycles(1)?;
                }
                Ok(())
            }
            form::CALL => {
                let target = self.fetch_imm32()?;
                if self.branch_condition()? {
                    let pc = self.regs.pc;
                    self.push_dword(pc)?;
                    self.regs.pc = target;
                    self.consume_machine_cycles(1)?;
                }
                Ok(())
            }
            form::INT => {
                let vector = u32::from(self.opcode.operand_byte());
                if vector >= g10_isa::IVT_SLOTS {
                    return Err(ExceptionCode::InvalidArgument);
                }
                let pc = self.regs.pc;
                self.push_dword(pc)?;
                self.regs.pc = g10_isa::vector_address(vector);
                self.consume_machine_cycles(1)
            }
            form::RET => {
                let cond = self
                    .opcode
                    .cond()
                    .map_err(|_| ExceptionCode::InvalidArgument)?;
                if cond != g10_isa::Cond::None {
                    self.consume_machine_cycles(1)?;
                }
                if cond.holds(self.regs.flags) {
                    self.regs.pc = self.pop_dword()?;
                    self.consume_machine_cycles(1)?;
                }
                Ok(())
            }
            form::RETI => {
                self.enable_interrupts(true);
                self.leave_exception_handler();
                self.regs.pc = self.pop_dword()?;
                self.consume_machine_cycles(1)
            }

            /* 8-bit arithmetic *******************************************/
            form::ADD_IMM8 => {
                let b = self.fetch_imm8()?;
                self.acc8(move |a, _, f| alu::add8(a, b, 0, f))
            }
            form::ADD_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.acc8(move |a, _, f| alu::add8(a, b, 0, f))
            }
            form::ADD_IND_D => {
                let b = self.operand_at_d(y)?;
                self.acc8(move |a, _, f| alu::add8(a, b, 0, f))
            }
            form::ADC_IMM8 => {
                let b = self.fetch_imm8()?;
                self.acc8(move |a, carry, f| alu::add8(a, b, carry, f))
            }
            form::ADC_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.acc8(move |a, carry, f| alu::add8(a, b, carry, f))
            }
            form::ADC_IND_D => {
                let b = self.operand_at_d(y)?;
                self.acc8(move |a, carry, f| alu::add8(a, b, carry, f))
            }
            form::SUB_IMM8 => {
                let b = self.fetch_imm8()?;
                self.acc8(move |a, _, f| alu::sub8(a, b, 0, f))
            }
            form::SUB_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.acc8(move |a, _, f| alu::sub8(a, b, 0, f))
            }
            form::SUB_IND_D => {
                let b = self.operand_at_d(y)?;
                self.acc8(move |a, _, f| alu::sub8(a, b, 0, f))
            }
            form::SBC_IMM8 => {
                let b = self.fetch_imm8()?;
                self.acc8(move |a, carry, f| alu::sub8(a, b, carry, f))
            }
            form::SBC_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.acc8(move |a, carry, f| alu::sub8(a, b, carry, f))
            }
            form::SBC_IND_D => {
                let b = self.operand_at_d(y)?;
                self.acc8(move |a, carry, f| alu::sub8(a, b, carry, f))
            }
            form::INC_L => {
                let reg = RegId::l(x);
                let value = self.read_reg(reg) as u8;
                let result = alu::inc8(value, &mut self.regs.flags);
                self.write_reg(reg, result.into());
                Ok(())
            }
            form::INC_IND_D => self.rmw_at_d(x, alu::inc8),
            form::DEC_L => {
                let reg = RegId::l(x);
                let value = self.read_reg(reg) as u8;
                let result = alu::dec8(value, &mut self.regs.flags);
                self.write_reg(reg, result.into());
                Ok(())
            }
            form::DEC_IND_D => self.rmw_at_d(x, alu::dec8),

            /* 16/32-bit arithmetic ***************************************/
            form::ADD_W_IMM16 => {
                let b = self.fetch_imm16()?;
                let a = self.read_reg(RegId::W0) as u16;
                let r = alu::add16(a, b, &mut self.regs.flags);
                self.write_reg(RegId::W0, r.into());
                self.consume_machine_cycles(1)
            }
            form::ADD_W_W => {
                let b = self.read_reg(RegId::w(y)) as u16;
                let a = self.read_reg(RegId::W0) as u16;
                let r = alu::add16(a, b, &mut self.regs.flags);
                self.write_reg(RegId::W0, r.into());
                self.consume_machine_cycles(1)
            }
            form::ADD_D_IMM32 => {
                let b = self.fetch_imm32()?;
                let a = self.read_reg(RegId::D0);
                let r = alu::add32(a, b, &mut self.regs.flags);
                self.write_reg(RegId::D0, r);
                self.consume_machine_cycles(3)
            }
            form::ADD_D_D => {
                let b = self.read_reg(RegId::d(y));
                let a = self.read_reg(RegId::D0);
                let r = alu::add32(a, b, &mut self.regs.flags);
                self.write_reg(RegId::D0, r);
                self.consume_machine_cycles(3)
            }
            form::SUB_W_IMM16 => {
                let b = self.fetch_imm16()?;
                let a = self.read_reg(RegId::W0) as u16;
                let r = alu::sub16(a, b, &mut self.regs.flags);
                self.write_reg(RegId::W0, r.into());
                self.consume_machine_cycles(1)
            }
            form::SUB_W_W => {
                let b = self.read_reg(RegId::w(y)) as u16;
                let a = self.read_reg(RegId::W0) as u16;
                let r = alu::sub16(a, b, &mut self.regs.flags);
                self.write_reg(RegId::W0, r.into());
                self.consume_machine_cycles(1)
            }
            form::SUB_D_IMM32 => {
                let b = self.fetch_imm32()?;
                let a = self.read_reg(RegId::D0);
                let r = alu::sub32(a, b, &mut self.regs.flags);
                self.write_reg(RegId::D0, r);
                self.consume_machine_cycles(3)
            }
            form::SUB_D_D => {
                let b = self.read_reg(RegId::d(y));
                let a = self.read_reg(RegId::D0);
                let r = alu::sub32(a, b, &mut self.regs.flags);
                self.write_reg(RegId::D0, r);
                self.consume_machine_cycles(3)
            }
            form::INC_W => {
                let reg = RegId::w(x);
                let value = self.read_reg(reg) as u16;
                let result = alu::inc16(value, &mut self.regs.flags);
                self.write_reg(reg, result.into());
                self.consume_machine_cycles(1)
            }
            form::INC_D => {
                let reg = RegId::d(x);
                let value = self.read_reg(reg);
                let result = alu::inc32(value, &mut self.regs.flags);
                self.write_reg(reg, result);
                self.consume_machine_cycles(3)
            }
            form::DEC_W => {
                let reg = RegId::w(x);
                let value = self.read_reg(reg) as u16;
                let result = alu::dec16(value, &mut self.regs.flags);
                self.write_reg(reg, result.into());
                self.consume_machine_cycles(1)
            }
            form::DEC_D => {
                let reg = RegId::d(x);
                let value = self.read_reg(reg);
                let result = alu::dec32(value, &mut self.regs.flags);
                self.write_reg(reg, result);
                self.consume_machine_cycles(3)
            }

            /* 8-bit logic ************************************************/
            form::AND_IMM8 => {
                let b = self.fetch_imm8()?;
                self.logic8(b, |a, b| a & b, true)
            }
            form::AND_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.logic8(b, |a, b| a & b, true)
            }
            form::AND_IND_D => {
                let b = self.operand_at_d(y)?;
                self.logic8(b, |a, b| a & b, true)
            }
            form::OR_IMM8 => {
                let b = self.fetch_imm8()?;
                self.logic8(b, |a, b| a | b, false)
            }
            form::OR_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.logic8(b, |a, b| a | b, false)
            }
            form::OR_IND_D => {
                let b = self.operand_at_d(y)?;
                self.logic8(b, |a, b| a | b, false)
            }
            form::XOR_IMM8 => {
                let b = self.fetch_imm8()?;
                self.logic8(b, |a, b| a ^ b, false)
            }
            form::XOR_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                self.logic8(b, |a, b| a ^ b, false)
            }
            form::XOR_IND_D => {
                let b = self.operand_at_d(y)?;
                self.logic8(b, |a, b| a ^ b, false)
            }
            form::NOT_L => {
                let reg = RegId::l(x);
                let result = !(self.read_reg(reg) as u8);
                self.write_reg(reg, result.into());
                self.not_flags();
                Ok(())
            }
            form::NOT_IND_D => {
                let addr = self.read_reg(RegId::d(x));
                let value = self.read_byte(addr)?;
                self.write_byte(addr, !value)?;
                self.not_flags();
                Ok(())
            }
            form::CMP_IMM8 => {
                let b = self.fetch_imm8()?;
                let a = self.read_reg(RegId::L0) as u8;
                alu::sub8(a, b, 0, &mut self.regs.flags);
                Ok(())
            }
            form::CMP_L => {
                let b = self.read_reg(RegId::l(y)) as u8;
                let a = self.read_reg(RegId::L0) as u8;
                alu::sub8(a, b, 0, &mut self.regs.flags);
                Ok(())
            }
            form::CMP_IND_D => {
                let b = self.operand_at_d(y)?;
                let a = self.read_reg(RegId::L0) as u8;
                alu::sub8(a, b, 0, &mut self.regs.flags);
                Ok(())
            }

            /* Shifts and swaps *******************************************/
            form::SLA_L => self.shift_reg(x, shift_sla),
            form::SLA_IND_D => self.rmw_at_d(x, shift_sla),
            form::SRA_L => self.shift_reg(x, shift_sra),
            form::SRA_IND_D => self.rmw_at_d(x, shift_sra),
            form::SRL_L => self.shift_reg(x, shift_srl),
            form::SRL_IND_D => self.rmw_at_d(x, shift_srl),
            form::SWAP_L => self.shift_reg(x, swap_nibbles),
            form::SWAP_IND_D => self.rmw_at_d(x, swap_nibbles),
            form::SWAP_W => {
                let reg = RegId::w(x);
                let value = self.read_reg(reg) as u16;
                let result = value.rotate_left(8);
                self.write_reg(reg, result.into());
                self.swap_flags(result == 0);
                Ok(())
            }
            form::SWAP_D => {
                let reg = RegId::d(x);
                let value = self.read_reg(reg);
                let result = value.rotate_left(16);
                self.write_reg(reg, result);
                self.swap_flags(result == 0);
                Ok(())
            }

            /* Rotates ****************************************************/
            form::RLA => self.rotate_acc(rot_rl),
            form::RL_L => self.shift_reg(x, rot_rl),
            form::RL_IND_D => self.rmw_at_d(x, rot_rl),
            form::RLCA => self.rotate_acc(rot_rlc),
            form::RLC_L => self.shift_reg(x, rot_rlc),
            form::RLC_IND_D => self.rmw_at_d(x, rot_rlc),
            form::RRA => self.rotate_acc(rot_rr),
            form::RR_L => self.shift_reg(x, rot_rr),
            form::RR_IND_D => self.rmw_at_d(x, rot_rr),
            form::RRCA => self.rotate_acc(rot_rrc),
            form::RRC_L => self.shift_reg(x, rot_rrc),
            form::RRC_IND_D => self.rmw_at_d(x, rot_rrc),

            /* Bit operations *********************************************/
            form::BIT_L => {
                let bit = Self::bit_index(y)?;
                let value = self.read_reg(RegId::l(x)) as u8;
                self.bit_flags(value, bit);
                Ok(())
            }
            form::BIT_IND_D => {
                let bit = Self::bit_index(y)?;
                let addr = self.read_reg(RegId::d(x));
                let value = self.read_byte(addr)?;
                self.bit_flags(value, bit);
                Ok(())
            }
            form::SET_L => self.bit_modify_reg(x, y, |v, bit| v | 1 << bit),
            form::SET_IND_D => self.bit_modify_mem(x, y, |v, bit| v | 1 << bit),
            form::RES_L => self.bit_modify_reg(x, y, |v, bit| v & !(1 << bit)),
            form::RES_IND_D => {
                self.bit_modify_mem(x, y, |v, bit| v & !(1 << bit))
            }
            form::TOG_L => self.bit_modify_reg(x, y, |v, bit| v ^ 1 << bit),
            form::TOG_IND_D => self.bit_modify_mem(x, y, |v, bit| v ^ 1 << bit),

            _ => Err(ExceptionCode::InvalidInstruction),
        }
    }

    /// Evaluate the branch condition field, validating the encoding.
    fn branch_condition(&self) -> Step<bool> {
        let cond = self
            .opcode
            .cond()
            .map_err(|_| ExceptionCode::InvalidArgument)?;
        Ok(cond.holds(self.regs.flags))
    }

    /// Accumulator-form 8-bit ALU step; the closure receives L0, the carry
    /// bit and the flags, and returns the new L0.
    fn acc8<F>(&mut self, op: F) -> Step
    where
        F: FnOnce(u8, u8, &mut Flags) -> u8,
    {
        let a = self.read_reg(RegId::L0) as u8;
        let carry = self.regs.flags.carry_bit();
        let result = op(a, carry, &mut self.regs.flags);
        self.write_reg(RegId::L0, result.into());
        Ok(())
    }

    /// Fetch the byte operand at the address held in `DY`.
    fn operand_at_d(&mut self, y: u8) -> Step<u8> {
        let addr = self.read_reg(RegId::d(y));
        self.read_byte(addr)
    }

    /// Read-modify-write the byte at the address held in `DX`.
    fn rmw_at_d<F>(&mut self, x: u8, op: F) -> Step
    where
        F: FnOnce(u8, &mut Flags) -> u8,
    {
        let addr = self.read_reg(RegId::d(x));
        let value = self.read_byte(addr)?;
        let result = op(value, &mut self.regs.flags);
        self.write_byte(addr, result)
    }

    /// Shift/rotate/swap on a byte register.
    fn shift_reg<F>(&mut self, x: u8, op: F) -> Step
    where
        F: FnOnce(u8, &mut Flags) -> u8,
    {
        let reg = RegId::l(x);
        let value = self.read_reg(reg) as u8;
        let result = op(value, &mut self.regs.flags);
        self.write_reg(reg, result.into());
        Ok(())
    }

    /// Accumulator rotate: same data path, but Z is forced clear.
    fn rotate_acc<F>(&mut self, op: F) -> Step
    where
        F: FnOnce(u8, &mut Flags) -> u8,
    {
        let value = self.read_reg(RegId::L0) as u8;
        let result = op(value, &mut self.regs.flags);
        self.regs.flags.set(Flags::Z, false);
        self.write_reg(RegId::L0, result.into());
        Ok(())
    }

    fn logic8<F>(&mut self, b: u8, op: F, half_carry: bool) -> Step
    where
        F: FnOnce(u8, u8) -> u8,
    {
        let a = self.read_reg(RegId::L0) as u8;
        let result = op(a, b);
        self.write_reg(RegId::L0, result.into());
        let flags = &mut self.regs.flags;
        flags.set(Flags::Z, result == 0);
        flags.set(Flags::N, false);
        flags.set(Flags::H, half_carry);
        flags.set(Flags::C, false);
        flags.set(Flags::V, false);
        Ok(())
    }

    fn not_flags(&mut self) {
        let flags = &mut self.regs.flags;
        flags.set(Flags::N, true);
        flags.set(Flags::H, true);
        flags.set(Flags::V, false);
    }

    fn swap_flags(&mut self, zero: bool) {
        let flags = &mut self.regs.flags;
        flags.set(Flags::Z, zero);
        flags.set(Flags::N, false);
        flags.set(Flags::H, false);
        flags.set(Flags::C, false);
    }

    fn bit_flags(&mut self, value: u8, bit: u8) {
        let flags = &mut self.regs.flags;
        flags.set(Flags::Z, value & (1 << bit) == 0);
        flags.set(Flags::N, false);
        flags.set(Flags::H, true);
    }

    fn bit_modify_reg(
        &mut self,
        x: u8,
        y: u8,
        op: fn(u8, u8) -> u8,
    ) -> Step {
        let bit = Self::bit_index(y)?;
        let reg = RegId::l(x);
        let value = self.read_reg(reg) as u8;
        self.write_reg(reg, op(value, bit).into());
        Ok(())
    }

    fn bit_modify_mem(
        &mut self,
        x: u8,
        y: u8,
        op: fn(u8, u8) -> u8,
    ) -> Step {
        let bit = Self::bit_index(y)?;
        let addr = self.read_reg(RegId::d(x));
        let value = self.read_byte(addr)?;
        self.write_byte(addr, op(value, bit))
    }

    /// Byte bit operations address bits 0..=7 only.
    fn bit_index(y: u8) -> Step<u8> {
        if y > 7 {
            Err(ExceptionCode::InvalidArgument)
        } else {
            Ok(y)
        }
    }
}

fn shift_sla(value: u8, flags: &mut Flags) -> u8 {
    let result = value << 1;
    flags.set(Flags::Z, result == 0);
    flags.set(Flags::N, false);
    flags.set(Flags::H, false);
    flags.set(Flags::C, value & 0x80 != 0);
    result
}

fn shift_sra(value: u8, flags: &mut Flags) -> u8 {
    let result = (value >> 1) | (value & 0x80);
    flags.set(Flags::Z, result == 0);
    flags.set(Flags::N, false);
    flags.set(Flags::H, false);
    flags.set(Flags::C, value & 0x01 != 0);
    result
}

fn shift_srl(value: u8, flags: &mut Flags) -> u8 {
    let result = value >> 1;
    flags.set(Flags::Z, result == 0);
    flags.set(Flags::N, false);
    flags.set(Flags::H, false);
    flags.set(Flags::C, value & 0x01 != 0);
    result
}

fn swap_nibbles(value: u8, flags: &mut Flags) -> u8 {
    let result = value.rotate_left(4);
    flags.set(Flags::Z, result == 0);
    flags.set(Flags::N, false);
    flags.set(Flags::H, false);
    flags.set(Flags::C, false);
    result
}

fn rot_rl(value: u8, flags: &mut Flags) -> u8 {
    let result = (value << 1) | flags.carry_bit();
    rotate_flags(flags, result, value & 0x80 != 0);
    result
}

fn rot_rlc(value: u8, flags: &mut Flags) -> u8 {
    let result = value.rotate_left(1);
    rotate_flags(flags, result, value & 0x80 != 0);
    result
}

fn rot_rr(value: u8, flags: &mut Flags) -> u8 {
    let result = (value >> 1) | (flags.carry_bit() << 7);
    rotate_flags(flags, result, value & 0x01 != 0);
    result
}

fn rot_rrc(value: u8, flags: &mut Flags) -> u8 {
    let result = value.rotate_right(1);
    rotate_flags(flags, result, value & 0x01 != 0);
    result
}

fn rotate_flags(flags: &mut Flags, result: u8, carry_out: bool) {
    flags.set(Flags::Z, result == 0);
    flags.set(Flags::N, false);
    flags.set(Flags::H, false);
    flags.set(Flags::C, carry_out);
}
