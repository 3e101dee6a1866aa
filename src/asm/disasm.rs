//! Human-readable dump of an instruction list.
//!
//! Indices restart at each segment marker, so program-segment numbers are
//! the values jump instructions use.

use crate::isa::{Instruction, Opcode};

/// Dump an instruction list with segment headings and per-segment indices.
pub fn disassemble(instructions: &[Instruction]) -> String {
    let mut output = String::new();
    let mut index = 0usize;

    for instr in instructions {
        match instr.opcode() {
            Opcode::Preload => {
                output.push_str("; ---- preload ----\n");
                index = 0;
            }
            Opcode::ProgramStart => {
                output.push_str("; ---- program ----\n");
                index = 0;
            }
            _ => {
                output.push_str(&format_line(index, instr));
                index += 1;
            }
        }
    }

    output
}

fn format_line(index: usize, instr: &Instruction) -> String {
    match instr.source_line() {
        Some(line) => format!("{:03}: {:<28} ; src {}\n", index, instr.to_string(), line),
        None => format!("{:03}: {}\n", index, instr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_restart_per_segment() {
        let program = vec![
            Instruction::bare(Opcode::Preload).unwrap(),
            Instruction::immediate(Opcode::Load, 1).unwrap(),
            Instruction::immediate(Opcode::Store, 2).unwrap(),
            Instruction::bare(Opcode::ProgramStart).unwrap(),
            Instruction::bare(Opcode::Halt).unwrap().with_source_line(4),
        ];
        let text = disassemble(&program);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "; ---- preload ----");
        assert_eq!(lines[2], "001: ST   [IMMEDIATE] 2");
        assert_eq!(lines[3], "; ---- program ----");
        assert!(lines[4].starts_with("000: HLT"));
        assert!(lines[4].ends_with("; src 4"));
    }
}
