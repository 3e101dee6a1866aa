//! The datapath: data bus, accumulator, address latch and the three
//! memory-mapped devices.
//!
//! Every operation here models one control signal. The control unit is
//! responsible for ordering them within a tick: select lines first, then
//! output-enable or write.

use crate::cpu::bus::{BusDevice, DataBus};
use crate::cpu::io::{InputDevice, OutputDevice};
use crate::cpu::memory::Ram;
use crate::cpu::CpuError;
use crate::isa::{Word, INPUT_PORT, OUTPUT_PORT};

/// Datapath state. Fields are reachable only through signal operations.
#[derive(Debug, Clone)]
pub struct Datapath {
    bus: DataBus,
    ram: Ram,
    input: InputDevice,
    output: OutputDevice,
    acc: Word,
    acc_in: Word,
    acc_out: bool,
    address: Word,
}

impl Datapath {
    pub fn new(input: impl IntoIterator<Item = char>) -> Self {
        Self {
            bus: DataBus::new(),
            ram: Ram::new(),
            input: InputDevice::new(input),
            output: OutputDevice::new(),
            acc: 0,
            acc_in: 0,
            acc_out: false,
            address: 0,
        }
    }

    /// Decode `addr` onto the chip-select lines and latch it.
    pub fn latch_address(&mut self, addr: Word) -> Result<(), CpuError> {
        let (input, output, ram) = match addr {
            INPUT_PORT => (true, false, false),
            OUTPUT_PORT => (false, true, false),
            _ => (false, false, true),
        };
        self.input.set_chip_select(input);
        self.output.set_chip_select(output);
        self.ram.set_chip_select(ram);
        self.ram.set_address(addr, &mut self.bus);
        self.address = addr;
        self.check_single_driver()
    }

    /// Output-enable line, shared by RAM and the input device.
    pub fn set_output_enable(&mut self, oe: bool) -> Result<(), CpuError> {
        self.input.set_output_enable(oe, &mut self.bus)?;
        self.ram.set_output_enable(oe, &mut self.bus)?;
        self.check_single_driver()
    }

    /// Write line, shared by RAM and the output device.
    pub fn set_write(&mut self, wr: bool) -> Result<(), CpuError> {
        self.output.set_write(wr, &self.bus)?;
        self.ram.set_write(wr, &self.bus)
    }

    /// Make the accumulator the bus driver, or release the bus.
    pub fn set_acc_drives_bus(&mut self, acc_out: bool) -> Result<(), CpuError> {
        self.acc_out = acc_out;
        if acc_out {
            self.bus.drive(self.acc);
        }
        self.check_single_driver()
    }

    /// Stage a value for the accumulator without committing it.
    pub fn set_pending_acc(&mut self, value: Word) {
        self.acc_in = value;
    }

    /// Commit the staged value into the accumulator.
    pub fn latch_accumulator(&mut self) {
        self.acc = self.acc_in;
        if self.acc_out {
            self.bus.drive(self.acc);
        }
    }

    pub fn read_bus(&self) -> Word {
        self.bus.read()
    }

    pub fn acc(&self) -> Word {
        self.acc
    }

    /// Currently latched memory address.
    pub fn address(&self) -> Word {
        self.address
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    /// Mutable RAM access for loaders and tests; bypasses the bus.
    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    /// Characters produced by the output device so far.
    pub fn output(&self) -> &str {
        self.output.output()
    }

    /// Characters the input device has not handed out yet.
    pub fn remaining_input(&self) -> String {
        self.input.remaining().collect()
    }

    fn check_single_driver(&self) -> Result<(), CpuError> {
        let drivers = [self.acc_out, self.ram.drives_bus(), self.input.drives_bus()]
            .into_iter()
            .filter(|&d| d)
            .count();
        if drivers > 1 {
            return Err(CpuError::BusContention(drivers));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_address_selects_ram() {
        let mut dp = Datapath::new("".chars());
        dp.ram_mut().write(5, 55);
        dp.latch_address(5).unwrap();
        dp.set_output_enable(true).unwrap();
        assert_eq!(dp.read_bus(), 55);
        assert_eq!(dp.address(), 5);
    }

    #[test]
    fn test_read_through_on_address_change() {
        let mut dp = Datapath::new("".chars());
        dp.ram_mut().write(1, 10);
        dp.ram_mut().write(10, 99);
        dp.latch_address(1).unwrap();
        dp.set_output_enable(true).unwrap();
        let pointer = dp.read_bus();
        dp.latch_address(pointer).unwrap();
        assert_eq!(dp.read_bus(), 99);
    }

    #[test]
    fn test_input_port_routing() {
        let mut dp = Datapath::new("z".chars());
        dp.latch_address(INPUT_PORT).unwrap();
        dp.set_output_enable(true).unwrap();
        assert_eq!(dp.read_bus(), 'z' as Word);
        assert!(dp.ram().is_empty());
        assert_eq!(dp.remaining_input(), "");
    }

    #[test]
    fn test_latching_input_port_does_not_read_it() {
        let mut dp = Datapath::new("k".chars());
        dp.ram_mut().write(3, INPUT_PORT);
        dp.latch_address(3).unwrap();
        dp.set_output_enable(true).unwrap();
        dp.latch_address(dp.read_bus()).unwrap();
        // Only an output-enable pulse pops a character.
        assert_eq!(dp.read_bus(), INPUT_PORT);
        assert_eq!(dp.remaining_input(), "k");
    }

    #[test]
    fn test_store_through_output_port() {
        let mut dp = Datapath::new("".chars());
        dp.set_pending_acc('!' as Word);
        dp.latch_accumulator();
        dp.latch_address(OUTPUT_PORT).unwrap();
        dp.set_acc_drives_bus(true).unwrap();
        dp.set_write(true).unwrap();
        assert_eq!(dp.output(), "!");
        assert!(dp.ram().is_empty());
    }

    #[test]
    fn test_accumulator_two_step_commit() {
        let mut dp = Datapath::new("".chars());
        dp.set_pending_acc(3);
        assert_eq!(dp.acc(), 0);
        dp.latch_accumulator();
        assert_eq!(dp.acc(), 3);

        dp.set_acc_drives_bus(true).unwrap();
        assert_eq!(dp.read_bus(), 3);
        dp.set_pending_acc(4);
        dp.latch_accumulator();
        assert_eq!(dp.read_bus(), 4);
    }

    #[test]
    fn test_two_drivers_is_a_fault() {
        let mut dp = Datapath::new("".chars());
        dp.latch_address(0).unwrap();
        dp.set_output_enable(true).unwrap();
        assert_eq!(dp.set_acc_drives_bus(true), Err(CpuError::BusContention(2)));

        let mut dp = Datapath::new("q".chars());
        dp.set_acc_drives_bus(true).unwrap();
        dp.latch_address(INPUT_PORT).unwrap();
        assert_eq!(dp.set_output_enable(true), Err(CpuError::BusContention(2)));
    }
}
