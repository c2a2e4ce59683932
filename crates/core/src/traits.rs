use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Terminal Client Trait
// ---------------------------------------------------------------------------

/// Errors raised by a terminal client for transport or protocol failures.
///
/// A rejected trade request is not an error: it comes back as an
/// [`OrderResult`] with a non-success return code.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Terminal not initialized")]
    NotInitialized,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("Terminal error: {0}")]
    Other(String),
}

/// One terminal session, driven by exactly one caller at a time.
///
/// Implementations are not expected to be reentrant; the pool guarantees
/// exclusive access for the duration of a lease.
#[async_trait]
pub trait TerminalClient: Send + Sync {
    /// Attach to the terminal at `executable_path`. Returns false on failure.
    async fn initialize(&mut self, executable_path: &str) -> Result<bool, TerminalError>;

    /// Detach from the terminal.
    async fn shutdown(&mut self) -> Result<(), TerminalError>;

    /// Log into an account. Returns false when the terminal refuses.
    async fn login(
        &mut self,
        account_id: u64,
        password: &str,
        server: &str,
    ) -> Result<bool, TerminalError>;

    /// Account currently authenticated, if any.
    async fn current_account(&mut self) -> Result<Option<AccountInfo>, TerminalError>;

    async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo, TerminalError>;

    async fn quote(&mut self, symbol: &str) -> Result<Quote, TerminalError>;

    async fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderResult, TerminalError>;

    async fn pending_orders(&mut self) -> Result<Vec<OrderRecord>, TerminalError>;

    async fn open_positions(&mut self) -> Result<Vec<PositionRecord>, TerminalError>;
}

/// Creates the client bound to a newly registered terminal executable.
pub trait TerminalFactory: Send + Sync {
    fn create(&self, executable_path: &str) -> Box<dyn TerminalClient>;
}

impl<F> TerminalFactory for F
where
    F: Fn(&str) -> Box<dyn TerminalClient> + Send + Sync,
{
    fn create(&self, executable_path: &str) -> Box<dyn TerminalClient> {
        self(executable_path)
    }
}
