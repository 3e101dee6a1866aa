//! Driver-facing facade: load a program, run it, report the result.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::asm::{assemble, parse_listing, AssemblerError, ListingError};
use crate::cpu::{ControlUnit, CpuError, Flags, Snapshot, Tick};
use crate::isa::{Instruction, Word};

/// What a run leaves behind for the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Characters written to the output port.
    pub output: String,
    /// Clock cycles of the program segment.
    pub ticks: u64,
    /// Instructions completed in the program segment.
    pub instructions: u64,
    pub accumulator: Word,
    pub flags: Flags,
    /// False when the run stopped on the tick limit.
    pub halted: bool,
}

impl Report {
    /// Capture the observable state of a machine.
    pub fn capture(cu: &ControlUnit) -> Self {
        Self {
            output: cu.output().to_string(),
            ticks: cu.tick_count(),
            instructions: cu.instruction_count(),
            accumulator: cu.acc(),
            flags: cu.flags(),
            halted: cu.is_halted(),
        }
    }
}

/// Run `program` on `input` until HLT, or until `max_ticks` cycles passed.
pub fn simulate(
    program: Vec<Instruction>,
    input: &str,
    max_ticks: Option<u64>,
) -> Result<Report, CpuError> {
    let mut cu = ControlUnit::new(program, input.chars())?;
    drive(&mut cu, max_ticks, |_| {})
}

/// Tick `cu` until HLT or until `max_ticks` more cycles passed, handing the
/// pre-tick snapshot to `on_tick`. On a fault the machine is left in place
/// for inspection.
pub fn drive(
    cu: &mut ControlUnit,
    max_ticks: Option<u64>,
    mut on_tick: impl FnMut(&Snapshot),
) -> Result<Report, CpuError> {
    let limit = cu.tick_count().saturating_add(max_ticks.unwrap_or(u64::MAX));
    while cu.tick_count() < limit {
        on_tick(&cu.snapshot());
        if cu.tick()? == Tick::Halted {
            break;
        }
    }
    tracing::info!(
        ticks = cu.tick_count(),
        instructions = cu.instruction_count(),
        halted = cu.is_halted(),
        "simulation finished"
    );
    Ok(Report::capture(cu))
}

/// Read a program from disk: `.asm` sources are assembled, anything else is
/// parsed as a listing.
pub fn load_program(path: &Path) -> Result<Vec<Instruction>, MachineError> {
    let text = std::fs::read_to_string(path).map_err(|e| MachineError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if path.extension().is_some_and(|ext| ext == "asm") {
        Ok(assemble(&text)?)
    } else {
        Ok(parse_listing(&text)?)
    }
}

/// Read the input stream for a run. No path means empty input.
pub fn load_input(path: Option<&Path>) -> Result<String, MachineError> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| MachineError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        None => Ok(String::new()),
    }
}

/// Errors surfaced to the driver.
#[derive(Debug, Clone, Error)]
pub enum MachineError {
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("assembly error: {0}")]
    Assembler(#[from] AssemblerError),

    #[error("listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("simulation error: {0}")]
    Cpu(#[from] CpuError),
}
