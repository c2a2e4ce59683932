use crate::action::{Action, RetryPolicy, RetryableAction};
use crate::error::DeskError;
use crate::executor::{panic_message, ActionExecutor};
use crate::ledger::{ActionId, ActionRecord, ResultLedger};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use termdesk_core::{Credential, DeskConfig, TerminalFactory};
use termdesk_pool::TerminalPool;
use tracing::{debug, error, info};

/// Shared context: terminal pool, result ledger and the retry policy new
/// actions get. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Desk {
    pool: Arc<TerminalPool>,
    ledger: Arc<ResultLedger>,
    executor: ActionExecutor,
    policy: RetryPolicy,
}

impl Desk {
    pub fn new(factory: Arc<dyn TerminalFactory>, policy: RetryPolicy) -> Self {
        let pool = Arc::new(TerminalPool::new(factory));
        let ledger = Arc::new(ResultLedger::new());
        let executor = ActionExecutor::new(Arc::clone(&pool), Arc::clone(&ledger));
        Self {
            pool,
            ledger,
            executor,
            policy,
        }
    }

    /// Desk with the retry policy and terminals from a config file.
    pub fn from_config(factory: Arc<dyn TerminalFactory>, config: &DeskConfig) -> Self {
        let desk = Self::new(factory, config.retry.clone().into());
        for entry in &config.terminals {
            desk.register_terminal(&entry.broker, &entry.path);
        }
        desk
    }

    pub fn with_acquire_timeout(mut self, wait: Duration) -> Self {
        self.executor = self.executor.with_acquire_timeout(wait);
        self
    }

    pub fn pool(&self) -> &Arc<TerminalPool> {
        &self.pool
    }

    pub fn ledger(&self) -> &Arc<ResultLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn register_terminal(&self, broker: &str, executable_path: &str) -> bool {
        self.pool.register(broker, executable_path)
    }

    pub fn list_terminals(&self) -> BTreeMap<String, Vec<String>> {
        self.pool.list()
    }

    fn wrap(&self, id: ActionId, credential: Credential, action: Box<dyn Action>) -> RetryableAction {
        RetryableAction::with_id(id, credential, action).with_policy(self.policy.clone())
    }

    /// Run an action to completion on the caller's task.
    pub async fn run(
        &self,
        credential: Credential,
        action: Box<dyn Action>,
    ) -> (ActionId, Result<Value, DeskError>) {
        let mut action = self.wrap(ActionId::new(), credential, action);
        let result = self.executor.execute(&mut action).await;
        (action.id(), result)
    }

    /// Queue an action in the background and return its identity at once.
    ///
    /// The ledger holds a pending record before this returns, so the
    /// identity is immediately queryable. A task that dies without a final
    /// record (a panic outside the action body) gets a failure record.
    pub fn submit(&self, credential: Credential, action: Box<dyn Action>) -> ActionId {
        let id = ActionId::new();
        self.ledger.append(id, ActionRecord::pending());

        let mut action = self.wrap(id, credential, action);
        info!(action_id = %id, action = %action.name(), "Action submitted");

        let executor = self.executor.clone();
        let run = tokio::spawn(async move { executor.execute(&mut action).await });

        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            // The outcome lives in the ledger.
            match run.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    debug!(action_id = %id, error = %e, "Submitted action ended with error")
                }
                Err(e) => {
                    let e = if e.is_panic() {
                        DeskError::Panicked(panic_message(e.into_panic().as_ref()))
                    } else {
                        DeskError::Action(e.to_string())
                    };
                    error!(action_id = %id, error = %e, "Submitted action aborted");
                    ledger.append(id, ActionRecord::failure(0, &e));
                }
            }
        });
        id
    }

    /// Latest record of an action, if the identity is known.
    pub fn fetch_result(&self, id: &ActionId) -> Option<ActionRecord> {
        self.ledger.last(id)
    }

    pub fn history(&self, id: &ActionId) -> Vec<ActionRecord> {
        self.ledger.history(id)
    }
}
