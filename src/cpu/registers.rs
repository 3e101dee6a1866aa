//! Control-unit registers and multiplexer selectors.
//!
//! - [`Flags`]: the N and Z condition flags
//! - [`PcSelect`]: how the next instruction fetch moves the program counter
//! - [`OperandSource`]: where the resolved operand is taken from

use serde::{Deserialize, Serialize};

use crate::isa::Word;

/// Condition flags, recomputed by every instruction with an observable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Z: the last result was zero.
    pub zero: bool,
    /// N: the last result was negative.
    pub negative: bool,
}

impl Flags {
    /// Flags at power-on: Z set, N clear.
    pub const fn new() -> Self {
        Self {
            zero: true,
            negative: false,
        }
    }

    /// Recompute both flags from a result.
    pub fn set_from(&mut self, value: i128) {
        self.zero = value == 0;
        self.negative = value < 0;
    }

    /// Flags for `SETG`: strictly positive last comparison.
    pub fn greater(&self) -> bool {
        !self.zero && !self.negative
    }

    /// Flags for `SETL`: strictly negative last comparison.
    pub fn less(&self) -> bool {
        !self.zero && self.negative
    }

    /// Flags for `SETE`.
    pub fn equal(&self) -> bool {
        self.zero && !self.negative
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new()
    }
}

/// Program-counter update applied by the next instruction fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcSelect {
    /// Advance to the following instruction.
    Increment,
    /// Load the program counter with a resolved jump target.
    Jump(Word),
}

/// Operand multiplexer in front of the execute stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandSource {
    /// The literal operand field of the instruction.
    Literal,
    /// Whatever argument fetch left on the data bus.
    Bus,
}

/// Map a boolean result into the word domain.
#[inline]
pub fn bool_to_word(b: bool) -> Word {
    Word::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_from_value() {
        let mut flags = Flags::new();
        assert!(flags.zero && !flags.negative);

        flags.set_from(100);
        assert!(!flags.zero && !flags.negative);
        assert!(flags.greater());

        flags.set_from(-100);
        assert!(!flags.zero && flags.negative);
        assert!(flags.less());

        flags.set_from(0);
        assert!(flags.equal());
        assert!(!flags.greater() && !flags.less());
    }

    #[test]
    fn test_bool_to_word() {
        assert_eq!(bool_to_word(true), 1);
        assert_eq!(bool_to_word(false), 0);
    }
}
