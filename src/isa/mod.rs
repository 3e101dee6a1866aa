//! Instruction set of the accumulator machine.
//!
//! This module is pure data:
//! - [`Opcode`] and [`AddressingMode`], the fixed instruction vocabulary
//! - [`Instruction`], one decoded instruction record
//! - [`parse_instruction`], the textual form used by instruction listings
//! - the memory map constants shared by the datapath and the assembler

pub mod instruction;

pub use instruction::{parse_instruction, AddressingMode, Instruction, InstructionError, Opcode};

/// Machine word. Every register, bus value, address and RAM cell is one word.
pub type Word = i64;

/// Reading this address pops the next character from the input device.
pub const INPUT_PORT: Word = 0x1000_0000;

/// Writing this address appends a character to the output device.
pub const OUTPUT_PORT: Word = 0x1000_0001;

/// First cell handed out by the assembler for data and label cells.
pub const DATA_START: Word = 0x2000_0000;

/// Last cell of the data segment.
pub const DATA_END: Word = 0x2FFF_FFFF;
