use core::fmt;

/// Exception codes delivered through the `EC` register.
///
/// Exceptions vector through interrupt slot 0; the handler reads `EC` to
/// learn what happened. Codes can be raised internally by the CPU or
/// externally by hardware on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ExceptionCode {
    /// No exception occurred.
    Ok = 0x00,
    /// An undecodable opcode word was fetched.
    InvalidInstruction = 0x01,
    /// An instruction carried an argument outside its legal range.
    InvalidArgument = 0x02,
    /// A read on the system bus was refused.
    InvalidRead = 0x03,
    /// A write on the system bus was refused.
    InvalidWrite = 0x04,
    /// An opcode fetch on the system bus was refused.
    InvalidExecute = 0x05,
    /// A division by zero was attempted.
    DivideByZero = 0x06,
    /// The stack pointer wrapped below the bottom of the stack.
    StackOverflow = 0x07,
    /// The stack pointer wrapped past the top of the address space.
    StackUnderflow = 0x08,
    /// A hardware component failed while ticking.
    HardwareError = 0x09,
    /// An exception was raised while one was already being handled.
    DoubleFault = 0x0A,
}

/// A byte that does not name an exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidExceptionCode(pub u8);

impl TryFrom<u8> for ExceptionCode {
    type Error = InvalidExceptionCode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let code = match byte {
            0x00 => Self::Ok,
            0x01 => Self::InvalidInstruction,
            0x02 => Self::InvalidArgument,
            0x03 => Self::InvalidRead,
            0x04 => Self::InvalidWrite,
            0x05 => Self::InvalidExecute,
            0x06 => Self::DivideByZero,
            0x07 => Self::StackOverflow,
            0x08 => Self::StackUnderflow,
            0x09 => Self::HardwareError,
            0x0A => Self::DoubleFault,
            other => return Err(InvalidExceptionCode(other)),
        };
        Ok(code)
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExceptionCode {}
