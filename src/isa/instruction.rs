//! Opcodes, addressing modes and the decoded instruction record.
//!
//! The textual form of an instruction is the one written into listings:
//! ```text
//! preload:
//! LD   [IMMEDIATE] 72
//! ST   [IMMEDIATE] 536870912
//! program:
//! INC
//! HLT
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Word;

/// How many operands an opcode takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Never carries an operand.
    None,
    /// Always carries an operand.
    One,
    /// May carry an operand; it is fetched but does not affect the result.
    Optional,
}

/// The closed set of operations understood by the control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // ==================== Structural markers ====================
    /// Start of the bootstrap segment.
    Preload,
    /// Start of the user-visible program.
    ProgramStart,

    // ==================== Zero operand ====================
    Halt,
    Negate,
    LogicalNot,
    SetIfGreater,
    SetIfLess,
    SetIfEqual,

    // ==================== One operand ====================
    Increment,
    Decrement,
    Jump,
    JumpIfZero,
    JumpIfNonZero,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Load,
    Store,
    And,
    Or,
    Compare,
}

impl Opcode {
    /// Every opcode, in declaration order.
    pub const ALL: [Opcode; 23] = [
        Opcode::Preload,
        Opcode::ProgramStart,
        Opcode::Halt,
        Opcode::Negate,
        Opcode::LogicalNot,
        Opcode::SetIfGreater,
        Opcode::SetIfLess,
        Opcode::SetIfEqual,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::Jump,
        Opcode::JumpIfZero,
        Opcode::JumpIfNonZero,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Rem,
        Opcode::Load,
        Opcode::Store,
        Opcode::And,
        Opcode::Or,
        Opcode::Compare,
    ];

    /// Listing spelling of the opcode. Markers include their trailing colon.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Preload => "preload:",
            Opcode::ProgramStart => "program:",
            Opcode::Halt => "HLT",
            Opcode::Negate => "NEG",
            Opcode::LogicalNot => "NOT",
            Opcode::SetIfGreater => "SETG",
            Opcode::SetIfLess => "SETL",
            Opcode::SetIfEqual => "SETE",
            Opcode::Increment => "INC",
            Opcode::Decrement => "DEC",
            Opcode::Jump => "JMP",
            Opcode::JumpIfZero => "JZ",
            Opcode::JumpIfNonZero => "JNZ",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Rem => "REM",
            Opcode::Load => "LD",
            Opcode::Store => "ST",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Compare => "CMP",
        }
    }

    /// Operand arity of the opcode.
    pub fn arity(self) -> Arity {
        match self {
            Opcode::Preload
            | Opcode::ProgramStart
            | Opcode::Halt
            | Opcode::Negate
            | Opcode::LogicalNot
            | Opcode::SetIfGreater
            | Opcode::SetIfLess
            | Opcode::SetIfEqual => Arity::None,
            Opcode::Increment | Opcode::Decrement => Arity::Optional,
            Opcode::Jump
            | Opcode::JumpIfZero
            | Opcode::JumpIfNonZero
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::Load
            | Opcode::Store
            | Opcode::And
            | Opcode::Or
            | Opcode::Compare => Arity::One,
        }
    }

    /// True for the `preload:` and `program:` markers.
    pub fn is_marker(self) -> bool {
        matches!(self, Opcode::Preload | Opcode::ProgramStart)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == s)
            .ok_or(())
    }
}

/// How an instruction's operand field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressingMode {
    /// The operand is the value.
    Immediate,
    /// The operand is the address of the value.
    #[default]
    Direct,
    /// The operand is the address of a cell holding the address of the value.
    Indirect,
}

impl AddressingMode {
    /// Listing spelling, without brackets.
    pub fn name(self) -> &'static str {
        match self {
            AddressingMode::Immediate => "IMMEDIATE",
            AddressingMode::Direct => "DIRECT",
            AddressingMode::Indirect => "INDIRECT",
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AddressingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATE" => Ok(AddressingMode::Immediate),
            "DIRECT" => Ok(AddressingMode::Direct),
            "INDIRECT" => Ok(AddressingMode::Indirect),
            _ => Err(()),
        }
    }
}

/// One decoded instruction. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInstruction")]
pub struct Instruction {
    opcode: Opcode,
    operand: Option<Word>,
    mode: AddressingMode,
    source_line: Option<usize>,
}

/// Unchecked serialized form of [`Instruction`].
#[derive(Deserialize)]
struct RawInstruction {
    opcode: Opcode,
    operand: Option<Word>,
    mode: AddressingMode,
    #[serde(default)]
    source_line: Option<usize>,
}

impl TryFrom<RawInstruction> for Instruction {
    type Error = InstructionError;

    fn try_from(raw: RawInstruction) -> Result<Self, Self::Error> {
        let instr = Self::new(raw.opcode, raw.operand, raw.mode)?;
        Ok(match raw.source_line {
            Some(line) => instr.with_source_line(line),
            None => instr,
        })
    }
}

impl Instruction {
    /// Build an instruction, checking the operand against the opcode's arity.
    pub fn new(
        opcode: Opcode,
        operand: Option<Word>,
        mode: AddressingMode,
    ) -> Result<Self, InstructionError> {
        match (opcode.arity(), operand) {
            (Arity::None, Some(_)) => Err(InstructionError::UnexpectedOperand(opcode)),
            (Arity::One, None) => Err(InstructionError::MissingOperand(opcode)),
            _ => Ok(Self {
                opcode,
                operand,
                mode,
                source_line: None,
            }),
        }
    }

    /// An instruction without operand.
    pub fn bare(opcode: Opcode) -> Result<Self, InstructionError> {
        Self::new(opcode, None, AddressingMode::Direct)
    }

    /// Shorthand for an `IMMEDIATE` instruction.
    pub fn immediate(opcode: Opcode, value: Word) -> Result<Self, InstructionError> {
        Self::new(opcode, Some(value), AddressingMode::Immediate)
    }

    /// Shorthand for a `DIRECT` instruction.
    pub fn direct(opcode: Opcode, addr: Word) -> Result<Self, InstructionError> {
        Self::new(opcode, Some(addr), AddressingMode::Direct)
    }

    /// Shorthand for an `INDIRECT` instruction.
    pub fn indirect(opcode: Opcode, addr: Word) -> Result<Self, InstructionError> {
        Self::new(opcode, Some(addr), AddressingMode::Indirect)
    }

    /// Attach the source line the instruction was translated from.
    pub fn with_source_line(mut self, line: usize) -> Self {
        self.source_line = Some(line);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operand(&self) -> Option<Word> {
        self.operand
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    pub fn source_line(&self) -> Option<usize> {
        self.source_line
    }

    /// True when the argument-fetch stage has nothing to read from memory.
    pub fn skips_argument_fetch(&self) -> bool {
        self.operand.is_none() || self.mode == AddressingMode::Immediate
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode.is_marker() {
            return f.write_str(self.opcode.mnemonic());
        }
        match self.operand {
            Some(operand) => {
                let mode = format!("[{}]", self.mode);
                write!(f, "{:<4} {:<11} {}", self.opcode.mnemonic(), mode, operand)
            }
            None => f.write_str(self.opcode.mnemonic()),
        }
    }
}

/// Parse one listing line into an instruction.
///
/// Accepts `preload:`, `program:`, `OP` and `OP [MODE] operand`, optionally
/// followed by a `; line N` comment recording the source line.
pub fn parse_instruction(text: &str) -> Result<Instruction, InstructionError> {
    let malformed = |reason: &str| InstructionError::Malformed {
        line: text.trim().to_string(),
        reason: reason.to_string(),
    };

    let (body, comment) = match text.find(';') {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };
    let parts: Vec<&str> = body.split_whitespace().collect();

    let Some((&mnemonic, rest)) = parts.split_first() else {
        return Err(malformed("empty line"));
    };
    let opcode: Opcode = mnemonic
        .parse()
        .map_err(|_| malformed(&format!("unknown mnemonic `{}`", mnemonic)))?;

    let instr = match rest {
        [] => Instruction::bare(opcode),
        [mode, operand] => {
            let mode = mode
                .strip_prefix('[')
                .and_then(|m| m.strip_suffix(']'))
                .ok_or_else(|| malformed("addressing mode must be written as [MODE]"))?;
            let mode: AddressingMode = mode
                .parse()
                .map_err(|_| malformed(&format!("unknown addressing mode `{}`", mode)))?;
            let operand: Word = operand
                .parse()
                .map_err(|_| malformed(&format!("invalid operand `{}`", operand)))?;
            Instruction::new(opcode, Some(operand), mode)
        }
        _ => return Err(malformed("expected `OP` or `OP [MODE] operand`")),
    }
    .map_err(|e| malformed(&e.to_string()))?;

    match comment.map(str::trim).and_then(|c| c.strip_prefix("line")) {
        Some(n) => {
            let n = n
                .trim()
                .parse()
                .map_err(|_| malformed("invalid `; line N` annotation"))?;
            Ok(instr.with_source_line(n))
        }
        None => Ok(instr),
    }
}

/// Errors raised while building or parsing an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("malformed instruction `{line}`: {reason}")]
    Malformed { line: String, reason: String },

    #[error("{0} takes no operand")]
    UnexpectedOperand(Opcode),

    #[error("{0} requires an operand")]
    MissingOperand(Opcode),
}
