//! Terminal pool.
//!
//! Each registered terminal executable is one [`TerminalHandle`] guarding a
//! single session. Handles are grouped by broker; acquiring picks a handle of
//! the account's broker at random and waits for its lock. The returned
//! [`TerminalLease`] releases the handle when dropped.

pub mod broker;
pub mod error;
pub mod handle;
pub mod pool;

pub use broker::broker_from_server;
pub use error::PoolError;
pub use handle::{TerminalHandle, TerminalLease};
pub use pool::TerminalPool;
