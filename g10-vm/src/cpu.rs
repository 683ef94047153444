use g10_isa::{vector_address, ExceptionCode, OpWord, RegId};
use tracing::{debug, trace};

use crate::{Bus, BusFault, RegisterFile, SPEED_SWITCH_MCYCLES};

/// Outcome of one micro-operation; `Err` feeds the exception mechanism.
pub(crate) type Step<T = ()> = Result<T, ExceptionCode>;

/// The G10 CPU context, connected to a system bus.
///
/// `tick()` advances the machine by at most one instruction. All memory
/// traffic goes through the bus one byte at a time, each byte costing one
/// machine cycle during which the bus ticks its peripherals.
#[derive(Debug)]
pub struct Cpu<B> {
    bus: B,
    pub(crate) regs: RegisterFile,

    pub(crate) opcode: OpWord,
    pub(crate) opcode_address: u32,

    ime: bool,
    imp: bool,
    halted: bool,
    stopped: bool,
    double_fault: bool,
    handling_exception: bool,

    speed_armed: bool,
    double_speed: bool,
    speed_switching: bool,

    m_cycles: u64,
    t_cycles: u64,
}

impl<B: Bus> Cpu<B> {
    /// A freshly reset CPU connected to `bus`.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            regs: RegisterFile::new(),
            opcode: OpWord::from_u16(0),
            opcode_address: 0,
            ime: false,
            imp: false,
            halted: false,
            stopped: false,
            double_fault: false,
            handling_exception: false,
            speed_armed: false,
            double_speed: false,
            speed_switching: false,
            m_cycles: 0,
            t_cycles: 0,
        }
    }

    /// Reset every register and internal state to power-on values.
    ///
    /// The bus is left alone; resetting peripherals is its owner's job.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new();
        self.opcode = OpWord::from_u16(0);
        self.opcode_address = 0;
        self.ime = false;
        self.imp = false;
        self.halted = false;
        self.stopped = false;
        self.double_fault = false;
        self.handling_exception = false;
        self.speed_armed = false;
        self.double_speed = false;
        self.speed_switching = false;
        self.m_cycles = 0;
        self.t_cycles = 0;
    }

    /// The connected bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the connected bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// The register file.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Mutable register access, for reset vectors and test harnesses.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Address the current instruction's opcode was fetched from.
    ///
    /// Useful to debuggers and trace consumers; `pc` has already moved on
    /// by the time an instruction executes.
    pub fn opcode_address(&self) -> u32 {
        self.opcode_address
    }

    /// Interrupt master enable.
    pub fn ime(&self) -> bool {
        self.ime
    }

    /// Force the interrupt master enable, bypassing the `EI` delay.
    pub fn set_ime(&mut self, on: bool) {
        self.ime = on;
        if !on {
            self.imp = false;
        }
    }

    /// Whether the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether the CPU is stopped, for any reason.
    pub fn is_stopped(&self) -> bool {
        self.stopped || self.double_fault
    }

    /// Whether the CPU stopped because of a double fault.
    pub fn is_double_faulted(&self) -> bool {
        self.double_fault
    }

    /// Whether a speed switch is currently in progress.
    pub fn is_switching_speed(&self) -> bool {
        self.speed_switching
    }

    /// Whether the CPU runs in double-speed mode.
    pub fn is_double_speed(&self) -> bool {
        self.double_speed
    }

    /// Machine cycles consumed since reset.
    pub fn m_cycles(&self) -> u64 {
        self.m_cycles
    }

    /// Timing cycles consumed since reset (four per machine cycle).
    pub fn t_cycles(&self) -> u64 {
        self.t_cycles
    }

    /// Wake the CPU from a normal `STOP`. A double-faulted CPU stays down.
    pub fn wake(&mut self) {
        if self.stopped && !self.double_fault {
            self.stopped = false;
        }
    }

    /// Advance the machine by at most one instruction.
    ///
    /// Returns `false` when this tick raised an exception (including the
    /// transition into double fault); `true` otherwise, even when the CPU
    /// is merely stopped or halted.
    pub fn tick(&mut self) -> bool {
        if self.is_stopped() {
            return true;
        }

        if self.halted {
            if self.any_enabled_irq_pending() {
                self.halted = false;
            } else {
                return match self.consume_machine_cycles(1) {
                    Ok(()) => true,
                    Err(code) => self.raise_exception(code),
                };
            }
        }

        if self.ime && self.any_enabled_irq_pending() {
            return match self.service_interrupt() {
                Ok(()) => true,
                Err(code) => self.raise_exception(code),
            };
        }

        match self.step_instruction() {
            Ok(()) => true,
            Err(code) => self.raise_exception(code),
        }
    }

    fn step_instruction(&mut self) -> Step {
        self.opcode_address = self.regs.pc;
        self.fetch_opcode()?;

        // EI's enable is delayed by one instruction: the pending flag is
        // promoted only at the end of an instruction other than EI itself.
        let is_ei = self.opcode.form() == g10_isa::form::EI;

        self.execute()?;

        if self.imp && !is_ei {
            self.imp = false;
            self.ime = true;
        }
        Ok(())
    }

    /// Raise `code` through interrupt vector 0.
    ///
    /// Returns `false` for every real exception; raising while one is
    /// already being handled latches the double-fault stop.
    pub fn raise_exception(&mut self, code: ExceptionCode) -> bool {
        if code == ExceptionCode::Ok {
            return true;
        }

        if self.handling_exception || code == ExceptionCode::DoubleFault {
            debug!(?code, "double fault, stopping");
            self.regs.ec = ExceptionCode::DoubleFault as u8;
            self.stopped = true;
            self.double_fault = true;
            self.halted = false;
            return false;
        }

        debug!(?code, pc = format_args!("{:#010x}", self.regs.pc), "exception");
        self.handling_exception = true;
        self.regs.ec = code as u8;

        let flags = u32::from(self.regs.flags.to_u8());
        let pc = self.regs.pc;
        if let Err(nested) = self
            .push_dword(flags)
            .and_then(|()| self.push_dword(pc))
        {
            // The exception frame itself could not be written.
            return self.raise_exception(nested);
        }

        self.ime = false;
        self.imp = false;
        self.regs.pc = vector_address(0);
        false
    }

    fn any_enabled_irq_pending(&self) -> bool {
        self.regs.ie & self.regs.irq != 0
    }

    /// Dispatch the lowest pending enabled interrupt.
    fn service_interrupt(&mut self) -> Step {
        let pending = self.regs.ie & self.regs.irq;
        let vector = pending.trailing_zeros();
        trace!(vector, "servicing interrupt");

        self.regs.irq &= !(1 << vector);
        self.ime = false;

        let flags = u32::from(self.regs.flags.to_u8());
        let pc = self.regs.pc;
        self.push_dword(flags)?;
        self.push_dword(pc)?;
        self.regs.pc = vector_address(vector);
        self.consume_machine_cycles(1)
    }

    pub(crate) fn enter_halt_state(&mut self) {
        self.halted = true;
    }

    pub(crate) fn enter_stop_state(&mut self) -> Step {
        if self.speed_armed {
            // An armed speed switch turns STOP into the switch sequence.
            self.speed_switching = true;
            self.double_speed = !self.double_speed;
            self.speed_armed = false;
            debug!(double_speed = self.double_speed, "speed switch");
            let result = self.consume_machine_cycles(SPEED_SWITCH_MCYCLES);
            self.speed_switching = false;
            result
        } else {
            self.stopped = true;
            Ok(())
        }
    }

    pub(crate) fn disable_interrupts(&mut self) {
        self.ime = false;
        self.imp = false;
    }

    pub(crate) fn enable_interrupts(&mut self, immediately: bool) {
        if immediately {
            self.ime = true;
            self.imp = false;
        } else {
            self.imp = true;
        }
    }

    pub(crate) fn leave_exception_handler(&mut self) {
        self.handling_exception = false;
    }

    /// Translate a bus fault into the exception it raises, keeping the
    /// faulting address visible in the trace.
    fn bus_exception(fault: BusFault) -> ExceptionCode {
        trace!(%fault, "bus fault");
        fault.exception_code()
    }

    /// Spend `m_cycles` machine cycles and give the bus its tick.
    pub(crate) fn consume_machine_cycles(&mut self, m_cycles: u32) -> Step {
        self.m_cycles += u64::from(m_cycles);
        self.t_cycles += u64::from(m_cycles) * 4;
        self.bus
            .on_machine_cycles(m_cycles)
            .map_err(Self::bus_exception)
    }

    pub(crate) fn read_byte(&mut self, addr: u32) -> Step<u8> {
        let value = self.bus.read(addr).map_err(Self::bus_exception)?;
        self.consume_machine_cycles(1)?;
        Ok(value)
    }

    pub(crate) fn write_byte(&mut self, addr: u32, value: u8) -> Step {
        self.bus
            .write(addr, value)
            .map_err(Self::bus_exception)?;
        self.consume_machine_cycles(1)
    }

    pub(crate) fn read_word(&mut self, addr: u32) -> Step<u16> {
        let lo = self.read_byte(addr)?;
        let hi = self.read_byte(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn write_word(&mut self, addr: u32, value: u16) -> Step {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(addr, lo)?;
        self.write_byte(addr.wrapping_add(1), hi)
    }

    pub(crate) fn read_dword(&mut self, addr: u32) -> Step<u32> {
        let lo = self.read_word(addr)?;
        let hi = self.read_word(addr.wrapping_add(2))?;
        Ok(u32::from(hi) << 16 | u32::from(lo))
    }

    pub(crate) fn write_dword(&mut self, addr: u32, value: u32) -> Step {
        self.write_word(addr, value as u16)?;
        self.write_word(addr.wrapping_add(2), (value >> 16) as u16)
    }

    /// Push a dword: SP moves down first, then the bytes are written.
    pub(crate) fn push_dword(&mut self, value: u32) -> Step {
        let (sp, overflow) = self.regs.sp.overflowing_sub(4);
        if overflow {
            return Err(ExceptionCode::StackOverflow);
        }
        self.regs.sp = sp;
        self.write_dword(sp, value)?;
        self.consume_machine_cycles(1)
    }

    /// Pop a dword: bytes are read, then SP moves up.
    pub(crate) fn pop_dword(&mut self) -> Step<u32> {
        let value = self.read_dword(self.regs.sp)?;
        let (sp, underflow) = self.regs.sp.overflowing_add(4);
        if underflow {
            return Err(ExceptionCode::StackUnderflow);
        }
        self.regs.sp = sp;
        self.consume_machine_cycles(1)?;
        Ok(value)
    }

    fn fetch_opcode(&mut self) -> Step {
        let b0 = self.fetch_code_byte()?;
        let b1 = self.fetch_code_byte()?;
        self.opcode = OpWord::from_bytes([b0, b1]);
        Ok(())
    }

    /// One byte from the instruction stream; refusals are execute faults
    /// at the fetch address, however the bus classified them.
    fn fetch_code_byte(&mut self) -> Step<u8> {
        let addr = self.regs.pc;
        let value = self.bus.read(addr).map_err(|fault| {
            Self::bus_exception(match fault {
                BusFault::Hardware => BusFault::Hardware,
                _ => BusFault::Execute(addr),
            })
        })?;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.consume_machine_cycles(1)?;
        Ok(value)
    }

    pub(crate) fn fetch_imm8(&mut self) -> Step<u8> {
        self.fetch_code_byte()
    }

    pub(crate) fn fetch_imm16(&mut self) -> Step<u16> {
        let lo = self.fetch_code_byte()?;
        let hi = self.fetch_code_byte()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn fetch_imm32(&mut self) -> Step<u32> {
        let lo = self.fetch_imm16()?;
        let hi = self.fetch_imm16()?;
        Ok(u32::from(hi) << 16 | u32::from(lo))
    }

    pub(crate) fn read_reg(&self, reg: RegId) -> u32 {
        self.regs.read(reg)
    }

    pub(crate) fn write_reg(&mut self, reg: RegId, value: u32) {
        self.regs.write(reg, value);
    }
}

/* Hardware register windows ***********************************************/

/// Byte windows onto the 32-bit `IRQ`/`IE` registers and the speed switch
/// register, for the bus to memory-map wherever it decides.
impl<B: Bus> Cpu<B> {
    /// Read byte `n` (0..=3) of the `IRQ` register.
    pub fn read_irq(&self, n: u8) -> u8 {
        (self.regs.irq >> (8 * (n & 3))) as u8
    }

    /// Write byte `n` (0..=3) of the `IRQ` register.
    pub fn write_irq(&mut self, n: u8, value: u8) -> u8 {
        let shift = 8 * u32::from(n & 3);
        self.regs.irq = (self.regs.irq & !(0xFF << shift))
            | (u32::from(value) << shift);
        value
    }

    /// Read byte `n` (0..=3) of the `IE` register.
    pub fn read_ie(&self, n: u8) -> u8 {
        (self.regs.ie >> (8 * (n & 3))) as u8
    }

    /// Write byte `n` (0..=3) of the `IE` register.
    pub fn write_ie(&mut self, n: u8, value: u8) -> u8 {
        let shift = 8 * u32::from(n & 3);
        self.regs.ie =
            (self.regs.ie & !(0xFF << shift)) | (u32::from(value) << shift);
        value
    }

    /// Read the `SPD` register: bit 0 armed, bit 7 double speed.
    pub fn read_spd(&self) -> u8 {
        u8::from(self.speed_armed) | (u8::from(self.double_speed) << 7)
    }

    /// Write the `SPD` register. Only bit 0 (armed) is writable; the
    /// double-speed bit is toggled by `STOP` alone.
    pub fn write_spd(&mut self, value: u8) -> u8 {
        self.speed_armed = value & 1 != 0;
        self.read_spd()
    }
}
