//! Book: a tradable instruction tracked through Null / Plan / Order / Position.
//!
//! The legal (state, operation) pairs live in [`transition`] as two pure
//! functions; [`Book`] performs the terminal calls and commits the result.
//! Terminal rejections are soft ([`OperationOutcome`] with `success == false`),
//! calling an operation in the wrong state is a hard [`BookError`].

pub mod book;
pub mod error;
pub mod inventory;
pub mod transition;

pub use book::{Book, OperationOutcome};
pub use error::BookError;
pub use inventory::load_books;
pub use transition::{BookState, Effect, Operation};
