//! Main memory.
//!
//! RAM is a sparse map from address to word over the whole `i64` address
//! space. Cells that were never written read as zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cpu::bus::{BusDevice, DataBus};
use crate::cpu::CpuError;
use crate::isa::Word;

/// RAM device.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Ram {
    cells: BTreeMap<Word, Word>,
    address: Word,
    cs: bool,
    oe: bool,
}

impl Ram {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a cell directly, bypassing the bus.
    #[inline]
    pub fn read(&self, addr: Word) -> Word {
        self.cells.get(&addr).copied().unwrap_or(0)
    }

    /// Write a cell directly, bypassing the bus.
    #[inline]
    pub fn write(&mut self, addr: Word, value: Word) {
        self.cells.insert(addr, value);
    }

    /// Latch a new address.
    ///
    /// Output-enable is re-applied, so a selected RAM with output-enable
    /// already asserted puts the new cell on the bus in the same tick.
    pub fn set_address(&mut self, addr: Word, bus: &mut DataBus) {
        self.address = addr;
        self.drive_if_enabled(bus);
    }

    /// Currently latched address.
    pub fn address(&self) -> Word {
        self.address
    }

    /// Every written cell, ordered by address.
    pub fn dump(&self) -> Vec<(Word, Word)> {
        self.cells.iter().map(|(&a, &v)| (a, v)).collect()
    }

    /// Number of written cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn drive_if_enabled(&self, bus: &mut DataBus) {
        if self.oe && self.cs {
            bus.drive(self.read(self.address));
        }
    }
}

impl BusDevice for Ram {
    fn set_chip_select(&mut self, cs: bool) {
        self.cs = cs;
    }

    fn set_output_enable(&mut self, oe: bool, bus: &mut DataBus) -> Result<(), CpuError> {
        self.oe = oe;
        self.drive_if_enabled(bus);
        Ok(())
    }

    fn set_write(&mut self, wr: bool, bus: &DataBus) -> Result<(), CpuError> {
        if wr && self.cs {
            self.write(self.address, bus.read());
        }
        Ok(())
    }

    fn drives_bus(&self) -> bool {
        self.cs && self.oe
    }
}

impl std::fmt::Debug for Ram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ram")
            .field("written_cells", &self.cells.len())
            .field("address", &self.address)
            .field("cs", &self.cs)
            .field("oe", &self.oe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_reads_zero() {
        let ram = Ram::new();
        assert_eq!(ram.read(0), 0);
        assert_eq!(ram.read(-5), 0);
        assert_eq!(ram.read(Word::MAX), 0);
        assert!(ram.is_empty());
    }

    #[test]
    fn test_output_enable_drives_selected_cell() {
        let mut ram = Ram::new();
        let mut bus = DataBus::new();
        ram.write(10, 42);

        ram.set_address(10, &mut bus);
        ram.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 0, "unselected RAM must not drive");

        ram.set_chip_select(true);
        ram.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 42);
        assert!(ram.drives_bus());
    }

    #[test]
    fn test_address_change_reads_through() {
        let mut ram = Ram::new();
        let mut bus = DataBus::new();
        ram.write(1, 11);
        ram.write(2, 22);
        ram.set_chip_select(true);
        ram.set_address(1, &mut bus);
        ram.set_output_enable(true, &mut bus).unwrap();
        assert_eq!(bus.read(), 11);

        ram.set_address(2, &mut bus);
        assert_eq!(bus.read(), 22);
    }

    #[test]
    fn test_write_commits_bus() {
        let mut ram = Ram::new();
        let mut bus = DataBus::new();
        bus.drive(7);

        ram.set_address(100, &mut bus);
        ram.set_write(true, &bus).unwrap();
        assert_eq!(ram.read(100), 0, "unselected RAM must not store");

        ram.set_chip_select(true);
        ram.set_write(false, &bus).unwrap();
        assert_eq!(ram.read(100), 0);
        ram.set_write(true, &bus).unwrap();
        assert_eq!(ram.read(100), 7);
        assert_eq!(ram.dump(), vec![(100, 7)]);
    }
}
