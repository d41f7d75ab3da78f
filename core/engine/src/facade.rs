//! Single entry point for application requests.
//!
//! Application code calls [`RequestFacade::submit`] instead of issuing
//! network calls directly; the façade transparently queues writes when
//! offline and serves cached reads when offline.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use backhaul_common::{Error, Priority, Result};

use crate::cache::CacheLayer;
use crate::monitor::NetworkMonitor;
use crate::queue::ActionQueue;
use crate::transport::{Request, Response, Transport};

/// Caller-supplied hint telling the façade whether and how to queue a
/// write when the network is unavailable.
#[derive(Debug, Clone)]
pub struct OfflinePolicy {
    /// Opaque label carried through to logs and sync records.
    pub kind: String,
    /// Scheduling class, which also fixes the retry budget.
    pub priority: Priority,
}

impl OfflinePolicy {
    pub fn new(kind: impl Into<String>, priority: Priority) -> Self {
        Self {
            kind: kind.into(),
            priority,
        }
    }
}

/// What a submission produced. `Queued` and `Cached` are deliberately
/// distinct from `Completed` so calling code can show provisional UI
/// instead of treating a queued write as a finished one.
#[derive(Debug)]
pub enum Submission {
    /// The live attempt completed with a success status.
    Completed(Response),
    /// Offline: the write was accepted into the queue without any network
    /// attempt.
    Queued { action_id: String },
    /// Offline: the read was answered from the cache.
    Cached(Vec<Vec<u8>>),
}

/// The request façade.
///
/// Offline reads are keyed by the request target: a successful live read
/// recorded via [`record_read`](RequestFacade::record_read) is cached
/// under its target URL, and an offline read of the same target serves
/// those payloads back.
#[derive(Clone)]
pub struct RequestFacade {
    monitor: Arc<NetworkMonitor>,
    transport: Arc<dyn Transport>,
    queue: ActionQueue,
    cache: CacheLayer,
}

impl RequestFacade {
    pub fn new(
        monitor: Arc<NetworkMonitor>,
        transport: Arc<dyn Transport>,
        queue: ActionQueue,
        cache: CacheLayer,
    ) -> Self {
        Self {
            monitor,
            transport,
            queue,
            cache,
        }
    }

    /// Issue a request, or queue/serve it locally when that is all the
    /// connectivity allows.
    ///
    /// # Errors
    /// - [`Error::Transport`]: the live attempt failed. If `policy` covers
    ///   a non-read method the action was queued first, but the error
    ///   still propagates: callers must not read "queued" as "succeeded".
    /// - [`Error::Rejected`]: the remote answered with an error status.
    /// - [`Error::CacheMiss`]: offline read with no cached data, distinct
    ///   from plain unavailability.
    /// - [`Error::Offline`]: offline write without an offline policy.
    pub async fn submit(
        &self,
        request: Request,
        policy: Option<OfflinePolicy>,
    ) -> Result<Submission> {
        if self.monitor.is_online() {
            self.submit_online(request, policy).await
        } else {
            self.submit_offline(request, policy).await
        }
    }

    async fn submit_online(
        &self,
        request: Request,
        policy: Option<OfflinePolicy>,
    ) -> Result<Submission> {
        match self.transport.send(&request).await {
            Ok(response) if response.is_success() => Ok(Submission::Completed(response)),
            Ok(response) => Err(Error::Rejected {
                status: response.status,
                message: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect(),
            }),
            Err(err) => {
                if let Some(policy) = policy {
                    if !request.method.is_read() {
                        let action_id = self
                            .queue
                            .enqueue(
                                policy.kind,
                                request.target,
                                request.method,
                                request.headers,
                                request.body,
                                policy.priority,
                            )
                            .await?;
                        warn!(%action_id, "Live attempt failed; queued for replay");
                    }
                }
                Err(err)
            }
        }
    }

    async fn submit_offline(
        &self,
        request: Request,
        policy: Option<OfflinePolicy>,
    ) -> Result<Submission> {
        if request.method.is_read() {
            let payloads = self.cache.fetch(Some(&request.target)).await?;
            if payloads.is_empty() {
                return Err(Error::CacheMiss(request.target));
            }
            debug!(target = %request.target, entries = payloads.len(), "Offline read served from cache");
            return Ok(Submission::Cached(payloads));
        }

        match policy {
            Some(policy) => {
                // Queued immediately, without ever touching the network.
                let action_id = self
                    .queue
                    .enqueue(
                        policy.kind,
                        request.target,
                        request.method,
                        request.headers,
                        request.body,
                        policy.priority,
                    )
                    .await?;
                Ok(Submission::Queued { action_id })
            }
            None => Err(Error::Offline(format!(
                "{} {} has no offline policy",
                request.method, request.target
            ))),
        }
    }

    /// Cache the payload of a successful live read under its target, so
    /// the same read can be answered offline later.
    pub async fn record_read(
        &self,
        target: impl Into<String>,
        payload: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<String> {
        self.cache.store(target.into(), payload, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backhaul_common::Method;
    use backhaul_store::{DurableStore, MemoryStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedTransport {
        calls: AtomicU32,
        response: Result<Response>,
    }

    impl ScriptedTransport {
        fn ok(status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: Ok(Response {
                    status,
                    body: b"payload".to_vec(),
                }),
            }
        }

        fn down() -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: Err(Error::Transport("unreachable".to_string())),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(Error::Transport(msg)) => Err(Error::Transport(msg.clone())),
                Err(_) => unreachable!(),
            }
        }
    }

    fn facade(
        online: bool,
        transport: Arc<ScriptedTransport>,
    ) -> (RequestFacade, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn DurableStore> = store.clone();
        let facade = RequestFacade::new(
            Arc::new(NetworkMonitor::new(online)),
            transport,
            ActionQueue::new(dyn_store.clone()),
            CacheLayer::new(dyn_store),
        );
        (facade, store)
    }

    #[tokio::test]
    async fn test_online_success_completes() {
        let transport = Arc::new(ScriptedTransport::ok(200));
        let (facade, store) = facade(true, transport.clone());

        let result = facade
            .submit(Request::new(Method::Post, "https://api.example.com/items"), None)
            .await
            .unwrap();

        assert!(matches!(result, Submission::Completed(r) if r.status == 200));
        assert!(store.list_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_rejection_is_not_queued() {
        let transport = Arc::new(ScriptedTransport::ok(422));
        let (facade, store) = facade(true, transport);

        let err = facade
            .submit(
                Request::new(Method::Post, "https://api.example.com/items"),
                Some(OfflinePolicy::new("create-item", Priority::High)),
            )
            .await
            .unwrap_err();

        // Target was reachable: that is a rejection, not the queue path.
        assert!(matches!(err, Error::Rejected { status: 422, .. }));
        assert!(store.list_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_transport_failure_queues_and_propagates() {
        let transport = Arc::new(ScriptedTransport::down());
        let (facade, store) = facade(true, transport);

        let err = facade
            .submit(
                Request::new(Method::Post, "https://api.example.com/items"),
                Some(OfflinePolicy::new("create-item", Priority::High)),
            )
            .await
            .unwrap_err();

        // The caller is told the live attempt failed...
        assert!(matches!(err, Error::Transport(_)));
        // ...even though a retry was queued.
        let actions = store.list_actions().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, "create-item");
        assert_eq!(actions[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_online_transport_failure_without_policy_not_queued() {
        let transport = Arc::new(ScriptedTransport::down());
        let (facade, store) = facade(true, transport);

        let err = facade
            .submit(Request::new(Method::Post, "https://api.example.com/items"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(store.list_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_write_queued_without_network_attempt() {
        let transport = Arc::new(ScriptedTransport::ok(200));
        let (facade, store) = facade(false, transport.clone());

        let result = facade
            .submit(
                Request::new(Method::Post, "https://api.example.com/items"),
                Some(OfflinePolicy::new("create-item", Priority::Medium)),
            )
            .await
            .unwrap();

        let Submission::Queued { action_id } = result else {
            panic!("expected queued submission");
        };
        assert!(store.get_action(&action_id).await.unwrap().is_some());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_write_without_policy_fails() {
        let transport = Arc::new(ScriptedTransport::ok(200));
        let (facade, _) = facade(false, transport);

        let err = facade
            .submit(Request::new(Method::Delete, "https://api.example.com/items/1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Offline(_)));
    }

    #[tokio::test]
    async fn test_offline_read_served_from_cache() {
        let transport = Arc::new(ScriptedTransport::ok(200));
        let (facade, _) = facade(false, transport.clone());

        facade
            .record_read("https://api.example.com/products", b"snapshot".to_vec(), None)
            .await
            .unwrap();

        let result = facade
            .submit(Request::new(Method::Get, "https://api.example.com/products"), None)
            .await
            .unwrap();

        assert!(matches!(result, Submission::Cached(p) if p == vec![b"snapshot".to_vec()]));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_cache_miss_is_distinct() {
        let transport = Arc::new(ScriptedTransport::ok(200));
        let (facade, _) = facade(false, transport);

        let err = facade
            .submit(Request::new(Method::Get, "https://api.example.com/products"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheMiss(_)));
    }
}
