use crate::error::DeskError;
use crate::ledger::{ActionId, ActionRecord, ResultLedger};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use termdesk_core::{Credential, RetryConfig, TerminalClient};
use tracing::{info, warn};

/// A unit of trading work run on a logged-in terminal.
#[async_trait]
pub trait Action: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Do the work. May be called again after a retryable error.
    async fn run(&mut self, terminal: &mut dyn TerminalClient) -> Result<Value, DeskError>;

    /// Called once after a successful run. Cannot change the result.
    async fn on_end(&mut self, _result: &Value) {}
}

/// How often an action body is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the last one included. Zero behaves like one.
    pub retry_times_on_error: u32,
    /// Pause after each failed attempt that is followed by another.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            retry_times_on_error: config.retry_times_on_error,
            backoff: config.backoff(),
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_times_on_error: u32, backoff: Duration) -> Self {
        Self {
            retry_times_on_error,
            backoff,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.retry_times_on_error.max(1)
    }
}

/// An [`Action`] bound to a credential, an identity and a retry budget.
pub struct RetryableAction {
    id: ActionId,
    credential: Credential,
    policy: RetryPolicy,
    remaining_retries: u32,
    action: Box<dyn Action>,
}

impl RetryableAction {
    pub fn new(credential: Credential, action: Box<dyn Action>) -> Self {
        Self::with_id(ActionId::new(), credential, action)
    }

    pub fn with_id(id: ActionId, credential: Credential, action: Box<dyn Action>) -> Self {
        let policy = RetryPolicy::default();
        Self {
            id,
            credential,
            remaining_retries: policy.total_attempts(),
            policy,
            action,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.remaining_retries = policy.total_attempts();
        self.policy = policy;
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn remaining_retries(&self) -> u32 {
        self.remaining_retries
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.policy.total_attempts() - self.remaining_retries
    }

    /// Run the action body until it succeeds or the budget is spent.
    ///
    /// Every attempt is recorded in `ledger`. Errors that are not retryable
    /// (illegal state, configuration) end the loop at once. The error of the
    /// last attempt is returned to the caller.
    pub async fn run_action(
        &mut self,
        terminal: &mut dyn TerminalClient,
        ledger: &ResultLedger,
    ) -> Result<Value, DeskError> {
        loop {
            self.remaining_retries = self.remaining_retries.saturating_sub(1);
            let attempt = self.attempts();

            match self.action.run(terminal).await {
                Ok(value) => {
                    self.action.on_end(&value).await;
                    info!(action_id = %self.id, action = %self.name(), attempt, "Action succeeded");
                    ledger.append(self.id, ActionRecord::success(attempt, value.clone()));
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && self.remaining_retries > 0 => {
                    warn!(
                        action_id = %self.id,
                        action = %self.name(),
                        attempt,
                        remaining = self.remaining_retries,
                        error = %e,
                        "Action failed, retrying"
                    );
                    ledger.append(self.id, ActionRecord::retry(attempt, &e));
                    if !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
                Err(e) => {
                    warn!(action_id = %self.id, action = %self.name(), attempt, error = %e, "Action failed");
                    ledger.append(self.id, ActionRecord::failure(attempt, &e));
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TaskStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use termdesk_book::BookState;
    use termdesk_terminals_simulated::SimulatedTerminal;

    /// Fails `failures` times, then succeeds.
    struct Flaky {
        failures: usize,
        runs: Arc<AtomicUsize>,
        ends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Action for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&mut self, _terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                Err(DeskError::Action(format!("failure {}", run + 1)))
            } else {
                Ok(Value::from(run as u64 + 1))
            }
        }

        async fn on_end(&mut self, _result: &Value) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Illegal;

    #[async_trait]
    impl Action for Illegal {
        fn name(&self) -> &str {
            "illegal"
        }

        async fn run(&mut self, _terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
            Err(DeskError::IllegalState {
                state: BookState::Null,
                operation: "close",
            })
        }
    }

    fn flaky(failures: usize) -> (Box<dyn Action>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let ends = Arc::new(AtomicUsize::new(0));
        let action = Flaky {
            failures,
            runs: runs.clone(),
            ends: ends.clone(),
        };
        (Box::new(action), runs, ends)
    }

    fn retryable(action: Box<dyn Action>, times: u32) -> RetryableAction {
        RetryableAction::new(Credential::new(1, "pw", "Acme-Live"), action)
            .with_policy(RetryPolicy::new(times, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_always_failing_makes_exactly_three_attempts() {
        let (action, runs, ends) = flaky(usize::MAX);
        let mut action = retryable(action, 3);
        let ledger = ResultLedger::new();

        let err = action
            .run_action(&mut SimulatedTerminal::default(), &ledger)
            .await
            .unwrap_err();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(ends.load(Ordering::SeqCst), 0);
        assert_eq!(err.to_string(), "action failed: failure 3");
        assert_eq!(action.attempts(), 3);

        let statuses: Vec<_> = ledger
            .history(&action.id())
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Retry, TaskStatus::Retry, TaskStatus::Failure]
        );
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let (action, runs, ends) = flaky(1);
        let mut action = retryable(action, 3);
        let ledger = ResultLedger::new();

        let value = action
            .run_action(&mut SimulatedTerminal::default(), &ledger)
            .await
            .unwrap();

        assert_eq!(value, Value::from(2u64));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(action.remaining_retries(), 1);

        let last = ledger.last(&action.id()).unwrap();
        assert_eq!(last.status, TaskStatus::Success);
        assert_eq!(last.result, Some(Value::from(2u64)));
    }

    #[tokio::test]
    async fn test_zero_retries_still_runs_once() {
        let (action, runs, _) = flaky(usize::MAX);
        let mut action = retryable(action, 0);

        assert!(action
            .run_action(&mut SimulatedTerminal::default(), &ResultLedger::new())
            .await
            .is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_illegal_state_is_not_retried() {
        let mut action = retryable(Box::new(Illegal), 3);
        let ledger = ResultLedger::new();

        let err = action
            .run_action(&mut SimulatedTerminal::default(), &ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::IllegalState { .. }));
        assert_eq!(action.attempts(), 1);
        assert_eq!(ledger.history(&action.id()).len(), 1);
    }

    #[test]
    fn test_default_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_times_on_error, 3);
        assert_eq!(policy.backoff, Duration::from_millis(500));
    }
}
