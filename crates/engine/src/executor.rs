use crate::action::RetryableAction;
use crate::error::DeskError;
use crate::ledger::{ActionRecord, ResultLedger};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use termdesk_core::{Credential, TerminalClient};
use termdesk_pool::{TerminalLease, TerminalPool};
use tracing::{debug, error, info, warn};

/// Runs actions on leased terminals.
///
/// Setup failures (unsupported broker, bad credential, initialize, login)
/// end the action with a single failure record; only the action body is
/// subject to the retry policy.
#[derive(Clone)]
pub struct ActionExecutor {
    pool: Arc<TerminalPool>,
    ledger: Arc<ResultLedger>,
    acquire_timeout: Option<Duration>,
}

impl ActionExecutor {
    pub fn new(pool: Arc<TerminalPool>, ledger: Arc<ResultLedger>) -> Self {
        Self {
            pool,
            ledger,
            acquire_timeout: None,
        }
    }

    /// Give up waiting for a busy terminal after `wait`.
    pub fn with_acquire_timeout(mut self, wait: Duration) -> Self {
        self.acquire_timeout = Some(wait);
        self
    }

    pub fn ledger(&self) -> &Arc<ResultLedger> {
        &self.ledger
    }

    pub async fn execute(&self, action: &mut RetryableAction) -> Result<Value, DeskError> {
        let id = action.id();
        let server = action.credential().server.clone();
        info!(action_id = %id, action = %action.name(), server = %server, "Executing action");

        let mut lease = match self.acquire(&server).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(action_id = %id, error = %e, "Could not acquire terminal");
                self.ledger.append(id, ActionRecord::failure(0, &e));
                return Err(e);
            }
        };

        let path = lease.executable_path().to_string();
        let result = match prepare(lease.client(), &path, action.credential()).await {
            Ok(()) => {
                let run = AssertUnwindSafe(action.run_action(lease.client(), &self.ledger));
                let caught = run.catch_unwind().await;
                match caught {
                    Ok(result) => result,
                    Err(payload) => {
                        let e = DeskError::Panicked(panic_message(payload.as_ref()));
                        error!(action_id = %id, error = %e, "Action panicked");
                        self.ledger
                            .append(id, ActionRecord::failure(action.attempts(), &e));
                        Err(e)
                    }
                }
            }
            Err(e) => {
                warn!(action_id = %id, path = %path, error = %e, "Terminal setup failed");
                self.ledger.append(id, ActionRecord::failure(0, &e));
                Err(e)
            }
        };

        if let Err(e) = lease.client().shutdown().await {
            warn!(action_id = %id, path = %path, error = %e, "Terminal shutdown failed");
        }
        self.pool.release(lease);
        result
    }

    async fn acquire(&self, server: &str) -> Result<TerminalLease, DeskError> {
        let lease = match self.acquire_timeout {
            Some(wait) => self.pool.acquire_timeout(server, wait).await?,
            None => self.pool.acquire(server).await?,
        };
        Ok(lease)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bring the session up: initialize, validate the credential, log in unless
/// the terminal is already on the right account.
async fn prepare(
    terminal: &mut dyn TerminalClient,
    path: &str,
    credential: &Credential,
) -> Result<(), DeskError> {
    let refused = |reason: String| DeskError::InitializationFailed {
        path: path.to_string(),
        reason,
    };
    match terminal.initialize(path).await {
        Ok(true) => {}
        Ok(false) => return Err(refused("refused by terminal".to_string())),
        Err(e) => return Err(refused(e.to_string())),
    }

    let account_id = credential
        .validate()
        .map_err(|e| DeskError::InvalidCredential(e.to_string()))?;

    let logged_in = matches!(
        terminal.current_account().await,
        Ok(Some(ref account)) if account.login == account_id
    );
    if logged_in {
        debug!(account_id, "Already logged in");
        return Ok(());
    }

    match terminal
        .login(account_id, &credential.secret, &credential.server)
        .await
    {
        Ok(true) => {
            info!(account_id, server = %credential.server, "Logged in");
            Ok(())
        }
        Ok(false) => Err(DeskError::LoginFailed {
            account_id,
            reason: "rejected by terminal".to_string(),
        }),
        Err(e) => Err(DeskError::LoginFailed {
            account_id,
            reason: e.to_string(),
        }),
    }
}
