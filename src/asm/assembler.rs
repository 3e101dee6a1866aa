//! Translator from the assembly dialect to a flat instruction list.
//!
//! Syntax:
//! ```text
//! ; Comment
//! section .data:
//!     hello: "Hi\n"       ; String, one cell per character plus a 0 terminator
//!     count: 3            ; Integer
//!     comma: ','          ; Character
//! section .text:
//! .loop                   ; Label
//!     LD INDIRECT ptr     ; OP MODE ARG, brackets and commas optional
//!     JZ DIRECT .done     ; Labels are jumped through their data cell
//!     ST DIRECT #STDOUT
//!     HLT
//! ```
//!
//! Data cells and label cells are allocated from [`DATA_START`] upwards and
//! filled by a generated preload segment of `LD [IMMEDIATE]` /
//! `ST [IMMEDIATE]` pairs. A label's cell holds the index of the instruction
//! following it, so `JMP DIRECT .loop` reads the cell and jumps there.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::isa::{
    AddressingMode, Instruction, InstructionError, Opcode, Word, DATA_END, DATA_START, INPUT_PORT,
    OUTPUT_PORT,
};

/// Assemble source code to an instruction list.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, AssemblerError> {
    assemble_with_symbols(source).map(|assembly| assembly.listing)
}

/// Assemble source code, keeping the symbol table.
pub fn assemble_with_symbols(source: &str) -> Result<Assembly, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// Output of the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// `preload:` segment (if any), `program:` marker, program segment.
    pub listing: Vec<Instruction>,
    /// Symbol name -> cell address, for data, labels and the I/O ports.
    pub symbols: BTreeMap<String, Word>,
}

/// A source line with its 1-based line number.
type Line<'a> = (usize, &'a str);

/// The assembler state.
struct Assembler {
    /// Symbol table (name -> address).
    symbols: BTreeMap<String, Word>,
    /// Next unallocated data cell.
    free_data: Word,
    preload: Vec<Instruction>,
    program: Vec<Instruction>,
}

impl Assembler {
    fn new() -> Self {
        let mut symbols = BTreeMap::new();
        symbols.insert("#STDIN".to_string(), INPUT_PORT);
        symbols.insert("#STDOUT".to_string(), OUTPUT_PORT);
        Self {
            symbols,
            free_data: DATA_START,
            preload: Vec::new(),
            program: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Assembly, AssemblerError> {
        let (data, text) = split_sections(source)?;

        for &(line_num, line) in &data {
            self.declare_data(line, line_num)?;
        }

        // Pass 1: place labels
        let mut index: Word = 0;
        for &(line_num, line) in &text {
            if let Some(label) = parse_label(line, line_num)? {
                self.declare_label(label, index, line_num)?;
            } else {
                index += 1;
            }
        }

        // Pass 2: emit instructions, all symbols now known
        for &(line_num, line) in &text {
            if !line.starts_with('.') {
                let instr = self.parse_instruction(line, line_num)?;
                self.program.push(instr.with_source_line(line_num));
            }
        }

        Ok(Assembly {
            listing: self.listing()?,
            symbols: self.symbols.clone(),
        })
    }

    fn listing(&self) -> Result<Vec<Instruction>, AssemblerError> {
        let marker = |op| {
            Instruction::bare(op)
                .map_err(|source| AssemblerError::InvalidInstruction { line: 0, source })
        };
        let mut out = Vec::with_capacity(self.preload.len() + self.program.len() + 2);
        if !self.preload.is_empty() {
            out.push(marker(Opcode::Preload)?);
            out.extend_from_slice(&self.preload);
        }
        out.push(marker(Opcode::ProgramStart)?);
        out.extend_from_slice(&self.program);
        Ok(out)
    }

    // ==================== Data ====================

    fn declare_data(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (name, value) = line.split_once(':').ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: "data declarations have the form <name>: <value>".into(),
        })?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid data name `{}`", name),
            });
        }

        let cells: Vec<Word> = if let Some(body) = quoted(value, '"') {
            let mut cells: Vec<Word> = unescape(body, line_num)?
                .chars()
                .map(|c| c as Word)
                .collect();
            cells.push(0);
            cells
        } else if value.starts_with('\'') {
            vec![parse_char(value, line_num)?]
        } else {
            vec![parse_number(value).ok_or_else(|| AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid data value `{}`", value),
            })?]
        };

        let first = self.free_data;
        self.define(name, first, line_num)?;
        for cell in cells {
            self.store_constant(cell, line_num)?;
        }
        Ok(())
    }

    fn declare_label(
        &mut self,
        label: &str,
        target: Word,
        line_num: usize,
    ) -> Result<(), AssemblerError> {
        let cell = self.free_data;
        self.define(label, cell, line_num)?;
        self.store_constant(target, line_num)
    }

    fn define(&mut self, name: &str, addr: Word, line_num: usize) -> Result<(), AssemblerError> {
        if self.symbols.insert(name.to_string(), addr).is_some() {
            return Err(AssemblerError::DuplicateSymbol {
                line: line_num,
                symbol: name.to_string(),
            });
        }
        Ok(())
    }

    /// Allocate the next data cell and emit the preload pair that fills it.
    fn store_constant(&mut self, value: Word, line_num: usize) -> Result<(), AssemblerError> {
        if self.free_data > DATA_END {
            return Err(AssemblerError::DataSegmentExhausted { line: line_num });
        }
        let addr = self.free_data;
        self.free_data += 1;
        let invalid = |source| AssemblerError::InvalidInstruction { line: line_num, source };
        self.preload.push(Instruction::immediate(Opcode::Load, value).map_err(invalid)?);
        self.preload.push(Instruction::immediate(Opcode::Store, addr).map_err(invalid)?);
        Ok(())
    }

    // ==================== Text ====================

    fn parse_instruction(
        &self,
        line: &str,
        line_num: usize,
    ) -> Result<Instruction, AssemblerError> {
        let fields = tokenize(line);
        let Some((mnemonic, rest)) = fields.split_first() else {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: "empty instruction".into(),
            });
        };

        let mnemonic = mnemonic.to_uppercase();
        let opcode = mnemonic
            .parse::<Opcode>()
            .ok()
            .filter(|op| !op.is_marker())
            .ok_or_else(|| AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.clone(),
            })?;

        let instr = match rest {
            [] => Instruction::bare(opcode),
            [mode, arg] => {
                let mode = parse_mode(mode, line_num)?;
                let value = self.resolve(arg, line_num)?;
                Instruction::new(opcode, Some(value), mode)
            }
            _ => {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "instructions have the form <op> or <op> <mode> <arg>".into(),
                })
            }
        };
        instr.map_err(|source| AssemblerError::InvalidInstruction { line: line_num, source })
    }

    /// Resolve an operand: number, character literal or symbol.
    fn resolve(&self, arg: &str, line_num: usize) -> Result<Word, AssemblerError> {
        if arg.starts_with('\'') {
            return parse_char(arg, line_num);
        }
        if let Some(value) = parse_number(arg) {
            return Ok(value);
        }
        self.symbols
            .get(arg)
            .copied()
            .ok_or_else(|| AssemblerError::UndefinedSymbol {
                line: line_num,
                symbol: arg.to_string(),
            })
    }
}

/// Split the source into data and text statements, comments removed.
fn split_sections(source: &str) -> Result<(Vec<Line<'_>>, Vec<Line<'_>>), AssemblerError> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Data,
        Text,
    }

    let mut section = Section::None;
    let mut seen_data = false;
    let mut seen_text = false;
    let mut data = Vec::new();
    let mut text = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line_num = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let header: Vec<&str> = line.split_whitespace().collect();
        if header.first() == Some(&"section") {
            let (next, seen) = match header.as_slice() {
                ["section", ".data:"] => (Section::Data, &mut seen_data),
                ["section", ".text:"] => (Section::Text, &mut seen_text),
                _ => {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("unknown section `{}`", line),
                    })
                }
            };
            if *seen {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "section declared twice".into(),
                });
            }
            *seen = true;
            section = next;
            continue;
        }

        match section {
            Section::Data => data.push((line_num, line)),
            Section::Text => text.push((line_num, line)),
            Section::None => {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "statement outside of a section".into(),
                })
            }
        }
    }

    if !seen_text {
        return Err(AssemblerError::MissingTextSection);
    }
    Ok((data, text))
}

/// Cut a trailing `;` comment, ignoring semicolons inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ';' => return &line[..i],
            None => {}
        }
    }
    line
}

/// Split an instruction on whitespace and commas, keeping character literals whole.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_char = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if in_char {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\'' {
                in_char = false;
            }
            continue;
        }
        if c.is_whitespace() || c == ',' {
            if let Some(s) = start.take() {
                tokens.push(&line[s..i]);
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        if c == '\'' {
            in_char = true;
        }
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }
    tokens
}

/// `.name` on a line of its own defines a label.
fn parse_label(line: &str, line_num: usize) -> Result<Option<&str>, AssemblerError> {
    if !line.starts_with('.') {
        return Ok(None);
    }
    let label = line.strip_suffix(':').unwrap_or(line).trim();
    if label.len() < 2 || label.contains(char::is_whitespace) {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid label `{}`", line),
        });
    }
    Ok(Some(label))
}

fn parse_mode(field: &str, line_num: usize) -> Result<AddressingMode, AssemblerError> {
    let bare = field
        .strip_prefix('[')
        .and_then(|f| f.strip_suffix(']'))
        .unwrap_or(field);
    bare.to_uppercase()
        .parse()
        .map_err(|_| AssemblerError::UnknownAddressingMode {
            line: line_num,
            mode: field.to_string(),
        })
}

/// Decimal or `0x` hexadecimal, optionally negative.
fn parse_number(text: &str) -> Option<Word> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let magnitude = if let Some(hex) = hex {
        Word::from_str_radix(hex, 16).ok()?
    } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()?
    } else {
        return None;
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_char(text: &str, line_num: usize) -> Result<Word, AssemblerError> {
    let invalid = || AssemblerError::SyntaxError {
        line: line_num,
        message: format!("invalid character literal {}", text),
    };
    let body = quoted(text, '\'').ok_or_else(invalid)?;
    let unescaped = unescape(body, line_num)?;
    let mut chars = unescaped.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c as Word),
        _ => Err(invalid()),
    }
}

/// The text between a leading and trailing `delim`, if `text` is quoted.
fn quoted(text: &str, delim: char) -> Option<&str> {
    let body = text.strip_prefix(delim)?.strip_suffix(delim)?;
    Some(body)
}

fn unescape(body: &str, line_num: usize) -> Result<String, AssemblerError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            other => {
                let tail = other.map(String::from).unwrap_or_default();
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("unknown escape sequence \\{}", tail),
                });
            }
        };
        out.push(escaped);
    }
    Ok(out)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("unknown addressing mode on line {line}: {mode}")]
    UnknownAddressingMode { line: usize, mode: String },

    #[error("undefined symbol on line {line}: {symbol}")]
    UndefinedSymbol { line: usize, symbol: String },

    #[error("duplicate symbol on line {line}: {symbol}")]
    DuplicateSymbol { line: usize, symbol: String },

    #[error("invalid instruction on line {line}: {source}")]
    InvalidInstruction {
        line: usize,
        #[source]
        source: InstructionError,
    },

    #[error("data segment exhausted on line {line}")]
    DataSegmentExhausted { line: usize },

    #[error("missing `section .text:`")]
    MissingTextSection,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(instr: &Instruction) -> (Opcode, Option<Word>, AddressingMode) {
        (instr.opcode(), instr.operand(), instr.mode())
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Simple test program
            section .text:
                LD IMMEDIATE 5
                INC
                ST [DIRECT] 100
                HLT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(result[0].opcode(), Opcode::ProgramStart);
        assert_eq!(op(&result[1]), (Opcode::Load, Some(5), AddressingMode::Immediate));
        assert_eq!(op(&result[2]), (Opcode::Increment, None, AddressingMode::Direct));
        assert_eq!(op(&result[3]), (Opcode::Store, Some(100), AddressingMode::Direct));
        assert_eq!(result[4].source_line(), Some(7));
    }

    #[test]
    fn test_assemble_data() {
        let source = r#"
        section .data:
            s: "ab"
            n: -17
            c: ','
        section .text:
            LD DIRECT n
            HLT
        "#;

        let asm = assemble_with_symbols(source).unwrap();
        assert_eq!(asm.symbols["s"], DATA_START);
        assert_eq!(asm.symbols["n"], DATA_START + 3);
        assert_eq!(asm.symbols["c"], DATA_START + 4);

        let preload: Vec<_> = asm.listing.iter().map(op).collect();
        assert_eq!(preload[0].0, Opcode::Preload);
        assert_eq!(preload[1], (Opcode::Load, Some('a' as Word), AddressingMode::Immediate));
        assert_eq!(preload[2], (Opcode::Store, Some(DATA_START), AddressingMode::Immediate));
        assert_eq!(preload[5], (Opcode::Load, Some(0), AddressingMode::Immediate));
        assert_eq!(preload[7], (Opcode::Load, Some(-17), AddressingMode::Immediate));
        assert_eq!(preload[9], (Opcode::Load, Some(44), AddressingMode::Immediate));
        assert_eq!(preload[11].0, Opcode::ProgramStart);
        assert_eq!(preload[12], (Opcode::Load, Some(DATA_START + 3), AddressingMode::Direct));
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        section .text:
        .start
            LD IMMEDIATE 3
        .loop
            DEC
            JNZ DIRECT .loop
            JMP DIRECT .end
            HLT
        .end
            HLT
        "#;

        let asm = assemble_with_symbols(source).unwrap();
        let start = asm.symbols[".start"];
        let lp = asm.symbols[".loop"];
        let end = asm.symbols[".end"];
        assert_eq!((start, lp, end), (DATA_START, DATA_START + 1, DATA_START + 2));

        // Each label cell is filled with the index of the next instruction.
        let preload: Vec<_> = asm.listing[1..7].iter().map(op).collect();
        assert_eq!(preload[0].1, Some(0));
        assert_eq!(preload[2].1, Some(1));
        assert_eq!(preload[4].1, Some(5));
        assert_eq!(op(&asm.listing[10]), (Opcode::JumpIfNonZero, Some(lp), AddressingMode::Direct));
    }

    #[test]
    fn test_forward_reference() {
        let source = "section .text:\nJMP DIRECT .later\n.later\nHLT\n";
        let result = assemble(source).unwrap();
        assert_eq!(result.last().unwrap().opcode(), Opcode::Halt);
    }

    #[test]
    fn test_sections_in_either_order() {
        let source = "section .text:\nLD DIRECT x\nHLT\nsection .data:\nx: 0x10\n";
        let asm = assemble_with_symbols(source).unwrap();
        assert_eq!(asm.listing[1].operand(), Some(16));
    }

    #[test]
    fn test_ports_and_char_operands() {
        let source = "section .text:\nLD DIRECT #STDIN\nCMP IMMEDIATE ';'\nST DIRECT, #STDOUT\nHLT";
        let result = assemble(source).unwrap();
        assert_eq!(result[1].operand(), Some(INPUT_PORT));
        assert_eq!(result[2].operand(), Some(';' as Word));
        assert_eq!(result[3].operand(), Some(OUTPUT_PORT));
    }

    #[test]
    fn test_string_escapes_and_comments() {
        let source = "section .data:\nmsg: \"a;\\n\" ; trailing\nsection .text:\nHLT\n";
        let asm = assemble_with_symbols(source).unwrap();
        let values: Vec<_> = asm
            .listing
            .iter()
            .filter(|i| i.opcode() == Opcode::Load)
            .map(|i| i.operand())
            .collect();
        assert_eq!(values, vec![Some('a' as Word), Some(';' as Word), Some(10), Some(0)]);
    }

    #[test]
    fn test_errors() {
        let cases: [(&str, fn(&AssemblerError) -> bool); 8] = [
            ("HLT", |e| matches!(e, AssemblerError::SyntaxError { line: 1, .. })),
            ("section .data:\nx: 1", |e| matches!(e, AssemblerError::MissingTextSection)),
            ("section .text:\nFOO", |e| {
                matches!(e, AssemblerError::UnknownMnemonic { line: 2, .. })
            }),
            ("section .text:\nLD SIDEWAYS 1", |e| {
                matches!(e, AssemblerError::UnknownAddressingMode { .. })
            }),
            ("section .text:\nLD DIRECT nowhere", |e| {
                matches!(e, AssemblerError::UndefinedSymbol { .. })
            }),
            ("section .text:\n.a\n.a\nHLT", |e| {
                matches!(e, AssemblerError::DuplicateSymbol { line: 3, .. })
            }),
            ("section .text:\nST", |e| matches!(e, AssemblerError::InvalidInstruction { .. })),
            ("section .text:\nLD 5", |e| matches!(e, AssemblerError::SyntaxError { line: 2, .. })),
        ];
        for (source, check) in cases {
            let err = assemble(source).unwrap_err();
            assert!(check(&err), "{:?} for {:?}", err, source);
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("-7"), Some(-7));
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("x1"), None);
        assert_eq!(parse_number("-"), None);
    }
}
