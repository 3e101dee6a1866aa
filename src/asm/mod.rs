//! Translator and listing tools.
//!
//! This module provides:
//! - A two-pass assembler (source text → instruction list with preload)
//! - The listing file format (load, save, parse, format)
//! - A numbered dump of instruction lists

pub mod assembler;
pub mod disasm;
pub mod listing;

pub use assembler::{assemble, assemble_with_symbols, AssemblerError, Assembly};
pub use disasm::disassemble;
pub use listing::{format_listing, load_listing, parse_listing, save_listing, ListingError};
