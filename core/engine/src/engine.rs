//! The composed offline engine.
//!
//! An explicitly constructed object the composition root owns and passes
//! around; there is no module-level singleton, so tests can run several
//! isolated engines side by side.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use backhaul_common::{Method, Priority, Result};
use backhaul_store::{DurableStore, SyncRecord};

use crate::cache::CacheLayer;
use crate::facade::{OfflinePolicy, RequestFacade, Submission};
use crate::monitor::NetworkMonitor;
use crate::queue::ActionQueue;
use crate::scheduler::{SyncScheduler, TriggerOutcome};
use crate::transport::{Request, Transport};

/// Configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between periodic drains.
    pub sync_interval: Duration,
    /// Interval between cache expiry sweeps.
    pub sweep_interval: Duration,
    /// Sync-history records retained in the store.
    pub history_limit: usize,
    /// Reachability assumed until the first monitor report.
    pub assume_online: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            history_limit: 100,
            assume_online: true,
        }
    }
}

/// Point-in-time view of the engine, for status surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub pending_count: usize,
    pub draining: bool,
    pub online: bool,
}

/// The offline action queue and synchronization engine.
///
/// Wires the durable store, network monitor, action queue, scheduler,
/// cache layer, and request façade into one unit. The connectivity
/// listener registered at construction triggers a drain on every
/// offline-to-online transition; [`start`](SyncEngine::start) adds the
/// periodic drain and cache sweep on top.
pub struct SyncEngine {
    store: Arc<dyn DurableStore>,
    monitor: Arc<NetworkMonitor>,
    scheduler: Arc<SyncScheduler>,
    queue: ActionQueue,
    cache: CacheLayer,
    facade: RequestFacade,
    config: EngineConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create a new engine over the given store and transport.
    pub fn new(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let monitor = Arc::new(NetworkMonitor::new(config.assume_online));
        let queue = ActionQueue::new(store.clone());
        let cache = CacheLayer::new(store.clone());
        let scheduler = Arc::new(SyncScheduler::new(
            store.clone(),
            transport.clone(),
            config.history_limit,
        ));
        let facade = RequestFacade::new(
            monitor.clone(),
            transport,
            queue.clone(),
            cache.clone(),
        );

        let engine = Arc::new(Self {
            store,
            monitor,
            scheduler,
            queue,
            cache,
            facade,
            config,
            tasks: Mutex::new(Vec::new()),
        });

        // Connectivity-restored trigger. Held weakly so the listener never
        // keeps a dropped engine alive.
        let weak: Weak<SyncEngine> = Arc::downgrade(&engine);
        engine.monitor.subscribe(move |online| {
            if !online {
                return;
            }
            if let Some(engine) = weak.upgrade() {
                tokio::spawn(async move {
                    if let Err(err) = engine.trigger_sync().await {
                        error!(%err, "Drain after reconnect failed");
                    }
                });
            }
        });

        engine
    }

    /// Spawn the periodic drain and cache-sweep tasks.
    ///
    /// Both run until the engine is dropped. Calling `start` twice stacks
    /// no duplicate tasks.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            debug!("Engine already started");
            return;
        }

        let weak = Arc::downgrade(self);
        let sync_interval = self.config.sync_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else { break };
                if !engine.monitor.is_online() {
                    continue;
                }
                if let Err(err) = engine.trigger_sync().await {
                    error!(%err, "Periodic drain failed");
                }
            }
        }));

        let weak = Arc::downgrade(self);
        let sweep_interval = self.config.sweep_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else { break };
                if let Err(err) = engine.cache.sweep_expired().await {
                    error!(%err, "Cache sweep failed");
                }
            }
        }));

        info!(
            sync_interval = ?self.config.sync_interval,
            sweep_interval = ?self.config.sweep_interval,
            "Engine background tasks started"
        );
    }

    /// Queue a mutation for replay. Returns the action id.
    pub async fn enqueue(
        &self,
        kind: impl Into<String>,
        target: impl Into<String>,
        method: Method,
        headers: std::collections::HashMap<String, String>,
        body: Option<Vec<u8>>,
        priority: Priority,
    ) -> Result<String> {
        self.queue
            .enqueue(kind, target, method, headers, body, priority)
            .await
    }

    /// Store read-side data for offline consumption.
    pub async fn store_cached_data(
        &self,
        category: impl Into<String>,
        payload: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<String> {
        self.cache.store(category, payload, ttl).await
    }

    /// Non-expired cached payloads; `None` returns every category.
    pub async fn get_cached_data(&self, category: Option<&str>) -> Result<Vec<Vec<u8>>> {
        self.cache.fetch(category).await
    }

    /// Submit a request through the façade.
    pub async fn submit(
        &self,
        request: Request,
        policy: Option<OfflinePolicy>,
    ) -> Result<Submission> {
        self.facade.submit(request, policy).await
    }

    /// The request façade, for callers that hold it directly.
    pub fn facade(&self) -> &RequestFacade {
        &self.facade
    }

    /// Manually trigger a drain. Shares the single-drain guard with the
    /// periodic and reconnect triggers.
    pub async fn trigger_sync(&self) -> Result<TriggerOutcome> {
        self.scheduler.drain().await
    }

    /// Current engine status.
    pub async fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            pending_count: self.queue.len().await?,
            draining: self.scheduler.is_draining(),
            online: self.monitor.is_online(),
        })
    }

    /// Recent drain records, newest first.
    pub async fn sync_history(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        self.store.list_sync_records(limit).await
    }

    /// The network monitor, for connectivity reporting and UI
    /// subscriptions.
    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backhaul_common::Error;
    use backhaul_store::MemoryStore;
    use crate::transport::Response;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FlakyTransport {
        calls: AtomicU32,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: &Request) -> backhaul_common::Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(Error::Transport("link down".to_string()))
            } else {
                Ok(Response {
                    status: 201,
                    body: vec![],
                })
            }
        }
    }

    fn engine(online: bool) -> (Arc<SyncEngine>, Arc<FlakyTransport>) {
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        });
        let config = EngineConfig {
            assume_online: online,
            ..EngineConfig::default()
        };
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()), transport.clone(), config);
        (engine, transport)
    }

    #[tokio::test]
    async fn test_status_reflects_queue_and_monitor() {
        let (engine, _) = engine(false);

        engine
            .enqueue(
                "create-item",
                "https://api.example.com/items",
                Method::Post,
                Default::default(),
                None,
                Priority::Medium,
            )
            .await
            .unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_count, 1);
        assert!(!status.online);
        assert!(!status.draining);
    }

    #[tokio::test]
    async fn test_online_transition_drains_queue() {
        let (engine, transport) = engine(false);

        engine
            .enqueue(
                "create-item",
                "https://api.example.com/items",
                Method::Post,
                Default::default(),
                None,
                Priority::Medium,
            )
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        engine.monitor().set_online(true);

        // The reconnect listener drains on a spawned task.
        for _ in 0..50 {
            if engine.status().await.unwrap().pending_count == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.status().await.unwrap().pending_count, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_accessor() {
        let (engine, _) = engine(true);
        engine
            .enqueue(
                "create-item",
                "https://api.example.com/items",
                Method::Post,
                Default::default(),
                None,
                Priority::Low,
            )
            .await
            .unwrap();

        engine.trigger_sync().await.unwrap();

        let history = engine.sync_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].succeeded, 1);
    }
}
