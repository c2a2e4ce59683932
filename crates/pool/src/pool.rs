use crate::broker::broker_from_server;
use crate::error::PoolError;
use crate::handle::{TerminalHandle, TerminalLease};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use termdesk_core::TerminalFactory;
use tracing::{debug, info};

/// Terminals grouped by broker.
///
/// Selection is uniformly random among a broker's handles; mutual exclusion
/// comes from each handle's lock, not from the selection.
pub struct TerminalPool {
    factory: Arc<dyn TerminalFactory>,
    terminals: RwLock<HashMap<String, Vec<Arc<TerminalHandle>>>>,
}

impl TerminalPool {
    pub fn new(factory: Arc<dyn TerminalFactory>) -> Self {
        Self {
            factory,
            terminals: RwLock::new(HashMap::new()),
        }
    }

    /// Register a terminal executable for a broker.
    ///
    /// Returns false (and changes nothing) if the path is already registered
    /// for that broker. The client is created outside the registry lock.
    pub fn register(&self, broker: &str, executable_path: &str) -> bool {
        if self.is_registered(broker, executable_path) {
            debug!(broker, path = executable_path, "Terminal already registered");
            return false;
        }
        let client = self.factory.create(executable_path);

        let mut terminals = self
            .terminals
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let handles = terminals.entry(broker.to_string()).or_default();
        // Another caller may have won the race while the client was built.
        if handles
            .iter()
            .any(|h| h.executable_path() == executable_path)
        {
            debug!(broker, path = executable_path, "Terminal already registered");
            return false;
        }
        handles.push(Arc::new(TerminalHandle::new(broker, executable_path, client)));
        info!(broker, path = executable_path, "Terminal registered");
        true
    }

    fn is_registered(&self, broker: &str, executable_path: &str) -> bool {
        self.terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broker)
            .is_some_and(|handles| {
                handles
                    .iter()
                    .any(|h| h.executable_path() == executable_path)
            })
    }

    /// Handles registered for a broker.
    pub fn handles(&self, broker: &str) -> Vec<Arc<TerminalHandle>> {
        self.terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broker)
            .cloned()
            .unwrap_or_default()
    }

    /// Broker name to registered executable paths.
    pub fn list(&self) -> BTreeMap<String, Vec<String>> {
        self.terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, handles)| !handles.is_empty())
            .map(|(broker, handles)| {
                let paths = handles
                    .iter()
                    .map(|h| h.executable_path().to_string())
                    .collect();
                (broker.clone(), paths)
            })
            .collect()
    }

    /// Pick a handle for an account server without locking it.
    pub fn select(&self, account_server: &str) -> Result<Arc<TerminalHandle>, PoolError> {
        let broker = broker_from_server(account_server);
        let terminals = self
            .terminals
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        terminals
            .get(broker)
            .and_then(|handles| handles.choose(&mut rand::thread_rng()))
            .cloned()
            .ok_or_else(|| PoolError::UnsupportedBroker(broker.to_string()))
    }

    /// Lease a terminal for an account server, waiting as long as it takes.
    pub async fn acquire(&self, account_server: &str) -> Result<TerminalLease, PoolError> {
        let handle = self.select(account_server)?;
        Ok(handle.lease().await)
    }

    /// Like [`acquire`](Self::acquire), but gives up after `wait`.
    pub async fn acquire_timeout(
        &self,
        account_server: &str,
        wait: Duration,
    ) -> Result<TerminalLease, PoolError> {
        let handle = self.select(account_server)?;
        let broker = handle.broker().to_string();
        tokio::time::timeout(wait, handle.lease())
            .await
            .map_err(|_| PoolError::AcquireTimeout {
                broker,
                waited: wait,
            })
    }

    /// Give a lease back. Equivalent to dropping it.
    pub fn release(&self, lease: TerminalLease) {
        drop(lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock, Weak};
    use termdesk_core::*;
    use termdesk_terminals_simulated::SimulatedTerminal;

    fn simulated_pool() -> TerminalPool {
        let factory = |_: &str| -> Box<dyn TerminalClient> { Box::new(SimulatedTerminal::demo()) };
        TerminalPool::new(Arc::new(factory))
    }

    #[tokio::test]
    async fn test_unregistered_broker_is_unsupported() {
        let pool = simulated_pool();
        for server in ["Nope", "Nope-Live", "", "XMTrading-Real"] {
            assert!(matches!(
                pool.acquire(server).await,
                Err(PoolError::UnsupportedBroker(_))
            ));
        }
    }

    #[test]
    fn test_register_same_path_twice_is_noop() {
        let pool = simulated_pool();
        assert!(pool.register("Acme", "/opt/acme/terminal64.exe"));
        assert!(!pool.register("Acme", "/opt/acme/terminal64.exe"));
        assert_eq!(pool.handles("Acme").len(), 1);

        // Same path under another broker is a different terminal.
        assert!(pool.register("Other", "/opt/acme/terminal64.exe"));
        assert!(pool.register("Acme", "/opt/acme2/terminal64.exe"));
        assert_eq!(pool.handles("Acme").len(), 2);

        let listed = pool.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(
            listed["Acme"],
            vec!["/opt/acme/terminal64.exe", "/opt/acme2/terminal64.exe"]
        );
    }

    #[test]
    fn test_factory_runs_outside_registry_lock() {
        let pool_slot: Arc<OnceLock<Weak<TerminalPool>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let (pool_slot, seen) = (Arc::clone(&pool_slot), Arc::clone(&seen));
            move |path: &str| -> Box<dyn TerminalClient> {
                // Reading the registry here would deadlock under the write lock.
                if let Some(pool) = pool_slot.get().and_then(Weak::upgrade) {
                    let brokers = pool.list().len();
                    seen.lock().unwrap().push((path.to_string(), brokers));
                }
                Box::new(SimulatedTerminal::demo())
            }
        };
        let pool = Arc::new(TerminalPool::new(Arc::new(factory)));
        pool_slot.set(Arc::downgrade(&pool)).unwrap();

        assert!(pool.register("Acme", "/a"));
        assert!(pool.register("Other", "/b"));
        assert!(!pool.register("Acme", "/a"));

        // One client per new terminal; the duplicate never reached the factory.
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("/a".to_string(), 0), ("/b".to_string(), 1)]
        );
        assert_eq!(pool.handles("Acme").len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_by_account_server() {
        let pool = simulated_pool();
        pool.register("Acme", "/opt/acme/terminal64.exe");

        let lease = pool.acquire("Acme-Live").await.unwrap();
        assert_eq!(lease.executable_path(), "/opt/acme/terminal64.exe");
        assert!(lease.handle().is_leased());
        pool.release(lease);

        assert!(!pool.handles("Acme")[0].is_leased());
        assert!(matches!(
            pool.acquire("Nope").await,
            Err(PoolError::UnsupportedBroker(b)) if b == "Nope"
        ));
    }

    #[tokio::test]
    async fn test_random_selection_reaches_every_handle() {
        let pool = simulated_pool();
        pool.register("Acme", "/a");
        pool.register("Acme", "/b");

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.select("Acme-Live").unwrap().executable_path().to_string());
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_timeout_when_held() {
        let pool = simulated_pool();
        pool.register("Acme", "/a");

        let held = pool.acquire("Acme-Live").await.unwrap();
        let result = pool
            .acquire_timeout("Acme-Live", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(PoolError::AcquireTimeout { .. })));

        drop(held);
        assert!(pool
            .acquire_timeout("Acme-Live", Duration::from_millis(50))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let pool = Arc::new(simulated_pool());
        pool.register("Acme", "/a");

        let held = pool.acquire("Acme-Live").await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("Acme-Live").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        pool.release(held);
        waiter.await.unwrap().unwrap();
    }

    /// Client that records overlapping calls.
    struct OverlapDetector {
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl OverlapDetector {
        async fn guarded(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TerminalClient for OverlapDetector {
        async fn initialize(&mut self, _path: &str) -> Result<bool, TerminalError> {
            self.guarded().await;
            Ok(true)
        }
        async fn shutdown(&mut self) -> Result<(), TerminalError> {
            self.guarded().await;
            Ok(())
        }
        async fn login(&mut self, _: u64, _: &str, _: &str) -> Result<bool, TerminalError> {
            self.guarded().await;
            Ok(true)
        }
        async fn current_account(&mut self) -> Result<Option<AccountInfo>, TerminalError> {
            self.guarded().await;
            Ok(None)
        }
        async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo, TerminalError> {
            Err(TerminalError::SymbolNotFound(symbol.to_string()))
        }
        async fn quote(&mut self, symbol: &str) -> Result<Quote, TerminalError> {
            Err(TerminalError::SymbolNotFound(symbol.to_string()))
        }
        async fn submit_order(&mut self, _: &OrderRequest) -> Result<OrderResult, TerminalError> {
            Err(TerminalError::Other("unused".to_string()))
        }
        async fn pending_orders(&mut self) -> Result<Vec<OrderRecord>, TerminalError> {
            self.guarded().await;
            Ok(Vec::new())
        }
        async fn open_positions(&mut self) -> Result<Vec<PositionRecord>, TerminalError> {
            self.guarded().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leases_on_same_handle_never_interleave() {
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = {
            let (busy, overlaps, calls) = (busy.clone(), overlaps.clone(), calls.clone());
            move |_: &str| -> Box<dyn TerminalClient> {
                Box::new(OverlapDetector {
                    busy: busy.clone(),
                    overlaps: overlaps.clone(),
                    calls: calls.clone(),
                })
            }
        };
        let pool = Arc::new(TerminalPool::new(Arc::new(factory)));
        pool.register("Acme", "/a");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let mut lease = pool.acquire("Acme-Live").await.unwrap();
                    let client = lease.client();
                    client.initialize("/a").await.unwrap();
                    client.login(1, "pw", "Acme-Live").await.unwrap();
                    client.pending_orders().await.unwrap();
                    client.open_positions().await.unwrap();
                    client.shutdown().await.unwrap();
                })
            })
            .collect();
        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 8 * 5);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
