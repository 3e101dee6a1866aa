//! # accsim
//!
//! A cycle-accurate simulator of a small accumulator machine.
//!
//! The machine has one accumulator, a sparse word-addressed RAM and two
//! memory-mapped character ports, all sharing a single data bus. A control
//! unit walks each instruction through fetch, argument fetch and execute,
//! counting the clock cycles every stage spends on the bus.

pub mod isa;
pub mod cpu;
pub mod asm;
pub mod machine;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use isa::{AddressingMode, Instruction, InstructionError, Opcode, Word};
pub use cpu::{ControlUnit, CpuError, Flags, Snapshot, Stage, Step, Tick};
pub use asm::{assemble, disassemble, load_listing, save_listing, AssemblerError, ListingError};
pub use machine::{load_program, simulate, MachineError, Report};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
