use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use termdesk_core::TerminalClient;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One terminal executable and the lock guarding its session.
///
/// Identity is the executable path. Handles are created at registration and
/// live as long as the pool.
pub struct TerminalHandle {
    broker: String,
    executable_path: String,
    session: Arc<Mutex<Box<dyn TerminalClient>>>,
}

impl TerminalHandle {
    pub fn new(broker: &str, executable_path: &str, client: Box<dyn TerminalClient>) -> Self {
        Self {
            broker: broker.to_string(),
            executable_path: executable_path.to_string(),
            session: Arc::new(Mutex::new(client)),
        }
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn executable_path(&self) -> &str {
        &self.executable_path
    }

    /// Whether some lease currently holds this handle.
    pub fn is_leased(&self) -> bool {
        self.session.try_lock().is_err()
    }

    /// Wait for the session lock. Waiters are served in FIFO order.
    pub async fn lease(self: Arc<Self>) -> TerminalLease {
        let client = Arc::clone(&self.session).lock_owned().await;
        debug!(broker = %self.broker, path = %self.executable_path, "Terminal acquired");
        TerminalLease {
            handle: self,
            client,
            acquired_at: Instant::now(),
        }
    }
}

impl fmt::Debug for TerminalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalHandle")
            .field("broker", &self.broker)
            .field("executable_path", &self.executable_path)
            .field("leased", &self.is_leased())
            .finish()
    }
}

/// Exclusive access to one terminal session. Dropping the lease releases it.
pub struct TerminalLease {
    handle: Arc<TerminalHandle>,
    client: OwnedMutexGuard<Box<dyn TerminalClient>>,
    acquired_at: Instant,
}

impl TerminalLease {
    pub fn handle(&self) -> &Arc<TerminalHandle> {
        &self.handle
    }

    pub fn executable_path(&self) -> &str {
        self.handle.executable_path()
    }

    pub fn client(&mut self) -> &mut dyn TerminalClient {
        &mut **self.client
    }
}

impl Drop for TerminalLease {
    fn drop(&mut self) {
        debug!(
            broker = %self.handle.broker,
            path = %self.handle.executable_path,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Terminal released"
        );
    }
}

impl fmt::Debug for TerminalLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalLease")
            .field("broker", &self.handle.broker)
            .field("executable_path", &self.handle.executable_path)
            .finish()
    }
}
