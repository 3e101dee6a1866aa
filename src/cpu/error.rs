//! Simulation faults.

use thiserror::Error;

use crate::cpu::control::Stage;
use crate::isa::Word;

/// Errors that abort a simulation run.
///
/// A halted machine is not an error; see [`crate::cpu::Tick::Halted`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("machine is not running (stage {0:?})")]
    NotRunning(Stage),

    #[error("input device read with no characters remaining")]
    InputExhausted,

    #[error("internal logic fault: {0}")]
    InternalLogicFault(String),

    #[error("bus contention: {0} drivers active at once")]
    BusContention(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("program counter {pc} outside of the loaded program (length {len})")]
    ProgramCounterOutOfRange { pc: Word, len: usize },

    #[error("value {0} written to the output device is not a character")]
    InvalidCharacter(Word),

    #[error("halt reached while running the preload segment")]
    BootstrapHalted,

    #[error("invalid program: {0}")]
    InvalidProgram(String),
}
