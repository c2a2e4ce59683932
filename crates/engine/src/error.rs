use std::time::Duration;
use termdesk_book::{BookError, BookState};
use termdesk_core::TerminalError;
use termdesk_pool::PoolError;

/// Errors surfaced by the desk to its callers.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    // Configuration: fatal, never retried.
    #[error("the broker is not supported: {0}")]
    UnsupportedBroker(String),
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("invalid book: {0}")]
    InvalidBook(String),

    // Session: fatal for the current attempt.
    #[error("failed to initialize terminal at {path}: {reason}")]
    InitializationFailed { path: String, reason: String },
    #[error("failed to log in with account ID: {account_id}: {reason}")]
    LoginFailed { account_id: u64, reason: String },
    #[error("no terminal of broker {broker} became free within {waited:?}")]
    AcquireTimeout { broker: String, waited: Duration },

    #[error("{operation} is not allowed in state {state:?}")]
    IllegalState {
        state: BookState,
        operation: &'static str,
    },

    // Business failures from the action body; these are retried.
    #[error("action failed: {0}")]
    Action(String),
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    /// The action body panicked; the session was shut down afterwards.
    #[error("action panicked: {0}")]
    Panicked(String),
}

impl DeskError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeskError::UnsupportedBroker(_)
                | DeskError::InvalidCredential(_)
                | DeskError::InvalidBook(_)
        )
    }

    pub fn is_session(&self) -> bool {
        matches!(
            self,
            DeskError::InitializationFailed { .. }
                | DeskError::LoginFailed { .. }
                | DeskError::AcquireTimeout { .. }
        )
    }

    /// Whether the retry loop may run the action body again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeskError::Action(_) | DeskError::Terminal(_))
    }
}

impl From<PoolError> for DeskError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::UnsupportedBroker(broker) => DeskError::UnsupportedBroker(broker),
            PoolError::AcquireTimeout { broker, waited } => {
                DeskError::AcquireTimeout { broker, waited }
            }
        }
    }
}

impl From<BookError> for DeskError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::IllegalState { state, operation } => {
                DeskError::IllegalState { state, operation }
            }
            other @ BookError::MissingTicket { .. } => DeskError::InvalidBook(other.to_string()),
            other @ BookError::OperationFailed { .. } => DeskError::Action(other.to_string()),
        }
    }
}
