//! Cycle-accurate simulation of the accumulator machine.
//!
//! This module implements:
//! - a shared data bus with RAM and two memory-mapped character devices
//! - the datapath: accumulator, address latch and signal-level operations
//! - the control unit: fetch / argument fetch / execute state machine

pub mod bus;
pub mod control;
pub mod datapath;
pub mod error;
pub mod io;
pub mod memory;
pub mod registers;

pub use bus::{BusDevice, DataBus};
pub use control::{ControlUnit, Snapshot, Stage, Step, Tick};
pub use datapath::Datapath;
pub use error::CpuError;
pub use io::{InputDevice, OutputDevice};
pub use memory::Ram;
pub use registers::{Flags, OperandSource, PcSelect};
