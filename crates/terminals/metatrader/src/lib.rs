//! MetaTrader 5 terminal client.
//!
//! Talks to a bridge process (an MT5 Python/MQL5 sidecar) over TCP using
//! length-prefixed JSON messages. One connection per terminal session;
//! every request gets exactly one reply.

pub mod client;
pub mod protocol;

pub use client::{MetaTraderBridge, MetaTraderFactory};
