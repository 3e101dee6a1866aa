//! The shared data bus and the contract of the devices hanging off it.

use crate::cpu::CpuError;
use crate::isa::Word;

/// The single shared value line of the datapath.
///
/// The cell itself does not arbitrate; the datapath counts active drivers
/// after every signal change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataBus {
    value: Word,
}

impl DataBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value on the bus.
    pub fn read(&self) -> Word {
        self.value
    }

    /// Put a value on the bus.
    pub fn drive(&mut self, value: Word) {
        self.value = value;
    }
}

/// A memory-mapped peripheral gated by chip-select.
///
/// Output-enable and write are no-ops unless the device is chip-selected.
pub trait BusDevice {
    /// Gate the device's responsiveness to the other two signals.
    fn set_chip_select(&mut self, cs: bool);

    /// Asserting output-enable makes a selected readable device drive the bus.
    fn set_output_enable(&mut self, _oe: bool, _bus: &mut DataBus) -> Result<(), CpuError> {
        Ok(())
    }

    /// Asserting write makes a selected writable device commit the bus value.
    fn set_write(&mut self, _wr: bool, _bus: &DataBus) -> Result<(), CpuError> {
        Ok(())
    }

    /// Whether the device currently holds the bus.
    fn drives_bus(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_holds_last_value() {
        let mut bus = DataBus::new();
        assert_eq!(bus.read(), 0);
        bus.drive(-17);
        bus.drive(42);
        assert_eq!(bus.read(), 42);
    }
}
