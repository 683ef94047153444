//! Cycle-accurate execution core for the G10 CPU.
//!
//! The [`Cpu`] owns the register file and all execution state; memory and
//! peripherals live behind the [`Bus`] trait. One [`Cpu::tick`] advances the
//! machine by at most one instruction (or one interrupt dispatch), and every
//! byte moved over the bus costs one machine cycle, during which the bus is
//! given the chance to tick its peripherals. Ordering between the CPU and
//! memory-mapped hardware is therefore deterministic down to the M-cycle.
//!
//! Architectural faults are not Rust errors: a refused bus access or an
//! illegal argument becomes an exception code in `EC`, vectored through
//! interrupt slot 0. A second fault while the first is still being handled
//! stops the machine for good (double fault).

#![warn(missing_docs)]

mod alu;
mod bus;
mod cpu;
mod exec;
mod regs;

pub use bus::{Bus, BusFault};
pub use cpu::Cpu;
pub use regs::RegisterFile;

/// Reset value of the program counter.
pub const RESET_PC: u32 = 0x0000_2000;

/// M-cycles spent switching speed when `STOP` runs with the switch armed.
pub const SPEED_SWITCH_MCYCLES: u32 = 2050;
