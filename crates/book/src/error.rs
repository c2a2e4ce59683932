use crate::transition::BookState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("{operation} is not allowed in state {state:?}")]
    IllegalState {
        state: BookState,
        operation: &'static str,
    },
    #[error("book in state {state:?} has no ticket")]
    MissingTicket { state: BookState },
    #[error("{operation} failed: {reason}")]
    OperationFailed {
        operation: String,
        reason: String,
    },
}
