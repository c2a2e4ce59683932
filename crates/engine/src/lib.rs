//! Execution engine.
//!
//! [`ActionExecutor`] leases a terminal for the action's credential, brings
//! the session up (initialize, validate, login), runs the action through its
//! [`RetryableAction`] wrapper and always shuts the session down and releases
//! the terminal. Every attempt is appended to the [`ResultLedger`].
//! [`Desk`] bundles pool, ledger and executor into one context object.

pub mod action;
pub mod actions;
pub mod desk;
pub mod error;
pub mod executor;
pub mod ledger;

pub use action::{Action, RetryPolicy, RetryableAction};
pub use actions::{AccountInfoAction, BookAction, ListBooksAction};
pub use desk::Desk;
pub use error::DeskError;
pub use executor::ActionExecutor;
pub use ledger::{ActionId, ActionRecord, ResultLedger, TaskStatus};
