//! In-memory terminal.
//!
//! Behaves like a single terminal executable: one login at a time, pending
//! orders and open positions kept in memory, quotes set by the caller.

pub mod terminal;

pub use terminal::{SimulatedTerminal, SimulatedTerminalConfig};
