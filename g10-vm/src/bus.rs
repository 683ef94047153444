use core::fmt;

use g10_isa::ExceptionCode;

/// A refused bus access, carrying the faulting address where one exists.
///
/// Bus implementations construct [`BusFault::Read`] and [`BusFault::Write`]
/// from their access handlers and [`BusFault::Hardware`] from a failing
/// peripheral tick. The CPU re-tags a fault on an opcode fetch as
/// [`BusFault::Execute`] before translating it into an exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    /// A read at this address was refused.
    Read(u32),
    /// A write at this address was refused.
    Write(u32),
    /// An opcode fetch at this address was refused.
    Execute(u32),
    /// A peripheral failed while ticking.
    Hardware,
}

impl BusFault {
    /// The address the fault occurred at, if it was an access fault.
    pub const fn address(self) -> Option<u32> {
        match self {
            Self::Read(addr) | Self::Write(addr) | Self::Execute(addr) => {
                Some(addr)
            }
            Self::Hardware => None,
        }
    }

    /// The exception code this fault raises.
    pub const fn exception_code(self) -> ExceptionCode {
        match self {
            Self::Read(_) => ExceptionCode::InvalidRead,
            Self::Write(_) => ExceptionCode::InvalidWrite,
            Self::Execute(_) => ExceptionCode::InvalidExecute,
            Self::Hardware => ExceptionCode::HardwareError,
        }
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(addr) => write!(f, "read fault at {addr:#010x}"),
            Self::Write(addr) => write!(f, "write fault at {addr:#010x}"),
            Self::Execute(addr) => write!(f, "execute fault at {addr:#010x}"),
            Self::Hardware => f.write_str("hardware fault"),
        }
    }
}

/// The system bus the CPU is connected to.
///
/// Implementations decode addresses, own the memory image and the
/// memory-mapped peripherals, and advance those peripherals in lock-step
/// with the CPU through [`Bus::on_machine_cycles`]. All multi-byte accesses
/// are made byte-by-byte by the CPU, little-endian, one M-cycle each.
pub trait Bus {
    /// Read one byte. A [`BusFault::Read`] becomes an `InvalidRead`
    /// exception (`InvalidExecute` when the CPU was fetching an opcode).
    fn read(&mut self, addr: u32) -> Result<u8, BusFault>;

    /// Write one byte. A [`BusFault::Write`] becomes an `InvalidWrite`
    /// exception.
    fn write(&mut self, addr: u32, value: u8) -> Result<(), BusFault>;

    /// Called once per machine cycle batch the CPU consumes, so peripherals
    /// tick in step. `Err` becomes a `HardwareError` exception.
    fn on_machine_cycles(&mut self, m_cycles: u32) -> Result<(), BusFault> {
        let _ = m_cycles;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_translate_to_their_exception_codes() {
        assert_eq!(
            BusFault::Read(0x10).exception_code(),
            ExceptionCode::InvalidRead
        );
        assert_eq!(
            BusFault::Write(0x10).exception_code(),
            ExceptionCode::InvalidWrite
        );
        assert_eq!(
            BusFault::Execute(0x10).exception_code(),
            ExceptionCode::InvalidExecute
        );
        assert_eq!(
            BusFault::Hardware.exception_code(),
            ExceptionCode::HardwareError
        );
    }

    #[test]
    fn access_faults_carry_their_address() {
        assert_eq!(BusFault::Read(0x2000).address(), Some(0x2000));
        assert_eq!(BusFault::Hardware.address(), None);
    }
}
