//! TUI debugger for the accumulator machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Program listing with the current instruction and breakpoints
//! - Datapath view (stage, accumulator, address latch, bus, flags)
//! - RAM view of every written cell
//! - Tick/step/run/breakpoint controls

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
