//! Character I/O devices mapped at [`INPUT_PORT`](crate::isa::INPUT_PORT)
//! and [`OUTPUT_PORT`](crate::isa::OUTPUT_PORT).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cpu::bus::{BusDevice, DataBus};
use crate::cpu::CpuError;
use crate::isa::Word;

/// Pops one character per output-enable pulse onto the bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDevice {
    buffer: VecDeque<char>,
    cs: bool,
    oe: bool,
}

impl InputDevice {
    pub fn new(input: impl IntoIterator<Item = char>) -> Self {
        Self {
            buffer: input.into_iter().collect(),
            cs: false,
            oe: false,
        }
    }

    /// Characters not read yet, front first.
    pub fn remaining(&self) -> impl Iterator<Item = char> + '_ {
        self.buffer.iter().copied()
    }
}

impl BusDevice for InputDevice {
    fn set_chip_select(&mut self, cs: bool) {
        self.cs = cs;
    }

    fn set_output_enable(&mut self, oe: bool, bus: &mut DataBus) -> Result<(), CpuError> {
        self.oe = oe;
        if !(oe && self.cs) {
            return Ok(());
        }
        let c = self.buffer.pop_front().ok_or(CpuError::InputExhausted)?;
        tracing::debug!(ch = ?c, remaining = self.buffer.len(), "input read");
        bus.drive(c as Word);
        Ok(())
    }

    fn drives_bus(&self) -> bool {
        self.cs && self.oe
    }
}

/// Appends the bus value, as a character, on every write pulse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputDevice {
    buffer: String,
    cs: bool,
}

impl OutputDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn output(&self) -> &str {
        &self.buffer
    }
}

impl BusDevice for OutputDevice {
    fn set_chip_select(&mut self, cs: bool) {
        self.cs = cs;
    }

    fn set_write(&mut self, wr: bool, bus: &DataBus) -> Result<(), CpuError> {
        if !(wr && self.cs) {
            return Ok(());
        }
        let value = bus.read();
        let c = u32::try_from(value)
            .ok()
            .and_then(char::from_u32)
            .ok_or(CpuError::InvalidCharacter(value))?;
        tracing::debug!(ch = ?c, "output write");
        self.buffer.push(c);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_pops_front() {
        let mut dev = InputDevice::new("ab".chars());
        let mut bus = DataBus::new();
        dev.set_chip_select(true);

        dev.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 97);
        dev.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 98);
        assert_eq!(
            dev.set_output_enable(true, &mut bus),
            Err(CpuError::InputExhausted)
        );
    }

    #[test]
    fn test_input_ignores_unselected() {
        let mut dev = InputDevice::new("x".chars());
        let mut bus = DataBus::new();
        dev.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 0);
        assert_eq!(dev.remaining().collect::<String>(), "x");
    }

    #[test]
    fn test_output_appends_selected_writes() {
        let mut dev = OutputDevice::new();
        let mut bus = DataBus::new();
        bus.drive('h' as Word);
        dev.set_write(true, &bus).unwrap();
        assert_eq!(dev.output(), "");

        dev.set_chip_select(true);
        dev.set_write(true, &bus).unwrap();
        bus.drive('i' as Word);
        dev.set_write(false, &bus).unwrap();
        dev.set_write(true, &bus).unwrap();
        assert_eq!(dev.output(), "hi");
    }

    #[test]
    fn test_output_rejects_non_characters() {
        let mut dev = OutputDevice::new();
        let mut bus = DataBus::new();
        dev.set_chip_select(true);
        bus.drive(-1);
        assert_eq!(dev.set_write(true, &bus), Err(CpuError::InvalidCharacter(-1)));
    }
}
