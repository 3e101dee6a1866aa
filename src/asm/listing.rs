//! Instruction listing files.
//!
//! A listing is the translator's output and the simulator's input:
//! - One instruction per line, in [`Instruction`]'s display form
//! - An optional `; line N` annotation records the source line
//! - Lines starting with `;` are comments
//! - Blank lines are ignored

use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::isa::{parse_instruction, Instruction, InstructionError};

/// Parse listing text into an instruction list.
pub fn parse_listing(text: &str) -> Result<Vec<Instruction>, ListingError> {
    let mut instructions = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        let instr = parse_instruction(trimmed).map_err(|source| ListingError::ParseError {
            line: line_num + 1,
            source,
        })?;
        instructions.push(instr);
    }

    Ok(instructions)
}

/// Render an instruction list as listing text.
pub fn format_listing(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instr in instructions {
        let text = instr.to_string();
        match instr.source_line() {
            Some(line) => out.push_str(&format!("{:<28} ; line {}\n", text, line)),
            None => {
                out.push_str(&text);
                out.push('\n');
            }
        }
    }
    out
}

/// Load a listing file from disk.
pub fn load_listing<P: AsRef<Path>>(path: P) -> Result<Vec<Instruction>, ListingError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ListingError::IoError(e.to_string()))?;
    parse_listing(&text)
}

/// Save a listing file to disk.
pub fn save_listing<P: AsRef<Path>>(
    path: P,
    instructions: &[Instruction],
) -> Result<(), ListingError> {
    let mut file =
        std::fs::File::create(path.as_ref()).map_err(|e| ListingError::IoError(e.to_string()))?;
    file.write_all(format_listing(instructions).as_bytes())
        .map_err(|e| ListingError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing listings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {source}")]
    ParseError {
        line: usize,
        #[source]
        source: InstructionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    #[test]
    fn test_listing_roundtrip() {
        let instructions = vec![
            Instruction::bare(Opcode::Preload).unwrap(),
            Instruction::immediate(Opcode::Load, 104).unwrap(),
            Instruction::immediate(Opcode::Store, 0x2000_0000).unwrap(),
            Instruction::bare(Opcode::ProgramStart).unwrap(),
            Instruction::direct(Opcode::Load, 0x1000_0000).unwrap().with_source_line(7),
            Instruction::bare(Opcode::Halt).unwrap(),
        ];

        let text = format_listing(&instructions);
        assert!(text.starts_with("preload:\nLD   [IMMEDIATE] 104\n"));
        assert!(text.contains("; line 7"));
        assert_eq!(parse_listing(&text).unwrap(), instructions);
    }

    #[test]
    fn test_listing_skips_comments() {
        let text = "; header\n\nprogram:\n  HLT  \n";
        let parsed = parse_listing(text).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_listing_reports_line() {
        let err = parse_listing("program:\nHLT\nBOGUS\n").unwrap_err();
        assert!(matches!(err, ListingError::ParseError { line: 3, .. }));
    }
}
