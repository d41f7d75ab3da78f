//! Queue draining with a single-drain mutual-exclusion guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use backhaul_common::{Error, Result};
use backhaul_store::{ActionFailure, DurableStore, PendingAction, SyncRecord};

use crate::queue::ActionQueue;
use crate::transport::{Request, Transport};

/// What a trigger produced.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A drain ran to completion; here is its record.
    Completed(SyncRecord),
    /// A drain was already in flight; this trigger was a no-op.
    AlreadyDraining,
}

/// Drains the action queue against the network.
///
/// All trigger sources (online transition, periodic timer, manual call)
/// funnel into [`drain`](SyncScheduler::drain), guarded by a single
/// atomic check-and-set so at most one drain runs at a time.
pub struct SyncScheduler {
    store: Arc<dyn DurableStore>,
    queue: ActionQueue,
    transport: Arc<dyn Transport>,
    draining: AtomicBool,
    history_limit: usize,
}

impl SyncScheduler {
    pub fn new(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        history_limit: usize,
    ) -> Self {
        Self {
            queue: ActionQueue::new(store.clone()),
            store,
            transport,
            draining: AtomicBool::new(false),
            history_limit,
        }
    }

    /// Whether a drain is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Attempt every currently pending action, in replay order.
    ///
    /// Concurrent triggers are a no-op: the guard is a compare-exchange,
    /// never a read-then-write, so two triggers racing under a concurrent
    /// runtime cannot both start draining.
    pub async fn drain(&self) -> Result<TriggerOutcome> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in flight; trigger ignored");
            return Ok(TriggerOutcome::AlreadyDraining);
        }

        let result = self.run_drain().await;
        self.draining.store(false, Ordering::Release);
        result.map(TriggerOutcome::Completed)
    }

    async fn run_drain(&self) -> Result<SyncRecord> {
        // Snapshot at drain start: actions enqueued while this drain runs
        // wait for the next trigger.
        let pending = self.queue.pending().await?;
        let mut record = SyncRecord::empty();
        if pending.is_empty() {
            return Ok(record);
        }

        info!(pending = pending.len(), "Draining action queue");

        // Strictly sequential: concurrent replay could reorder dependent
        // writes hitting the same backend resource.
        for mut action in pending {
            let request = Request::from(&action);
            match self.transport.send(&request).await {
                Ok(response) if response.is_success() => {
                    self.store.delete_action(&action.id).await?;
                    record.succeeded += 1;
                    debug!(id = %action.id, kind = %action.kind, "Action delivered");
                }
                Ok(response) => {
                    let reason = Error::Rejected {
                        status: response.status,
                        message: String::from_utf8_lossy(&response.body)
                            .chars()
                            .take(200)
                            .collect(),
                    }
                    .to_string();
                    self.record_failed_attempt(&mut action, reason, &mut record)
                        .await?;
                }
                Err(err) => {
                    self.record_failed_attempt(&mut action, err.to_string(), &mut record)
                        .await?;
                }
            }
        }

        self.store.append_sync_record(&record).await?;
        self.store.prune_sync_records(self.history_limit).await?;

        info!(
            succeeded = record.succeeded,
            failed = record.failed,
            "Drain complete"
        );
        Ok(record)
    }

    /// Bookkeeping for one failed attempt. Transport and rejected failures
    /// count identically toward the budget; the reason string alone keeps
    /// the distinction.
    async fn record_failed_attempt(
        &self,
        action: &mut PendingAction,
        reason: String,
        record: &mut SyncRecord,
    ) -> Result<()> {
        action.mark_attempt_failed();

        if action.is_exhausted() {
            // Terminal: the action is gone for good and only the sync
            // record reports it.
            self.store.delete_action(&action.id).await?;
            record.failed += 1;
            record.failures.push(ActionFailure {
                action_id: action.id.clone(),
                reason: reason.clone(),
            });
            warn!(
                id = %action.id,
                kind = %action.kind,
                attempts = action.attempts,
                %reason,
                "Attempt budget exhausted; action dropped"
            );
        } else {
            self.store.put_action(action).await?;
            debug!(
                id = %action.id,
                attempts = action.attempts,
                limit = action.attempt_limit,
                %reason,
                "Attempt failed; action kept queued"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backhaul_common::{Method, Priority};
    use backhaul_store::MemoryStore;
    use crate::transport::Response;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    /// Transport that fails every call the chosen way.
    struct FailingTransport {
        calls: AtomicU32,
        reject: bool,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Ok(Response {
                    status: 500,
                    body: b"boom".to_vec(),
                })
            } else {
                Err(Error::Transport("connection refused".to_string()))
            }
        }
    }

    struct OkTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(&self, _request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response {
                status: 200,
                body: vec![],
            })
        }
    }

    async fn enqueue(store: &Arc<MemoryStore>, priority: Priority) -> String {
        let queue = ActionQueue::new(store.clone() as Arc<dyn DurableStore>);
        queue
            .enqueue(
                "create-item",
                "https://api.example.com/items",
                Method::Post,
                HashMap::new(),
                None,
                priority,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_removes_action() {
        let store = Arc::new(MemoryStore::new());
        let id = enqueue(&store, Priority::Medium).await;

        let transport = Arc::new(OkTransport {
            calls: AtomicU32::new(0),
        });
        let scheduler =
            SyncScheduler::new(store.clone(), transport.clone(), 100);

        let outcome = scheduler.drain().await.unwrap();
        let record = match outcome {
            TriggerOutcome::Completed(record) => record,
            TriggerOutcome::AlreadyDraining => panic!("no drain in flight"),
        };

        assert_eq!(record.succeeded, 1);
        assert_eq!(record.failed, 0);
        assert!(store.get_action(&id).await.unwrap().is_none());

        // A later drain must not touch the delivered action again.
        scheduler.drain().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_drops_low_priority_after_three() {
        let store = Arc::new(MemoryStore::new());
        let id = enqueue(&store, Priority::Low).await;

        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
            reject: false,
        });
        let scheduler = SyncScheduler::new(store.clone(), transport, 100);

        // Attempts 1 and 2: still queued.
        for expected_attempts in 1..=2 {
            scheduler.drain().await.unwrap();
            let action = store.get_action(&id).await.unwrap().unwrap();
            assert_eq!(action.attempts, expected_attempts);
        }

        // Attempt 3: terminal.
        let outcome = scheduler.drain().await.unwrap();
        let record = match outcome {
            TriggerOutcome::Completed(record) => record,
            TriggerOutcome::AlreadyDraining => panic!("no drain in flight"),
        };
        assert!(store.get_action(&id).await.unwrap().is_none());
        assert_eq!(record.failed, 1);
        assert_eq!(record.failures[0].action_id, id);
    }

    #[tokio::test]
    async fn test_rejected_counts_like_transport_failure() {
        let store = Arc::new(MemoryStore::new());
        let id = enqueue(&store, Priority::Low).await;

        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
            reject: true,
        });
        let scheduler = SyncScheduler::new(store.clone(), transport, 100);

        scheduler.drain().await.unwrap();
        scheduler.drain().await.unwrap();
        let outcome = scheduler.drain().await.unwrap();
        let record = match outcome {
            TriggerOutcome::Completed(record) => record,
            TriggerOutcome::AlreadyDraining => panic!("no drain in flight"),
        };

        assert!(store.get_action(&id).await.unwrap().is_none());
        assert!(record.failures[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn test_terminal_failure_does_not_abort_drain() {
        let store = Arc::new(MemoryStore::new());
        // One action already at its last allowed attempt, one fresh.
        let doomed_id = enqueue(&store, Priority::Low).await;
        let mut doomed = store.get_action(&doomed_id).await.unwrap().unwrap();
        doomed.attempts = 2;
        store.put_action(&doomed).await.unwrap();
        let fresh_id = enqueue(&store, Priority::Low).await;

        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
            reject: false,
        });
        let scheduler = SyncScheduler::new(store.clone(), transport.clone(), 100);

        scheduler.drain().await.unwrap();

        // Both were attempted despite the first one failing terminally.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert!(store.get_action(&doomed_id).await.unwrap().is_none());
        assert_eq!(
            store.get_action(&fresh_id).await.unwrap().unwrap().attempts,
            1
        );
    }

    #[tokio::test]
    async fn test_drain_appends_history() {
        let store = Arc::new(MemoryStore::new());
        enqueue(&store, Priority::Medium).await;

        let transport = Arc::new(OkTransport {
            calls: AtomicU32::new(0),
        });
        let scheduler = SyncScheduler::new(store.clone(), transport, 100);
        scheduler.drain().await.unwrap();

        let history = store.list_sync_records(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].succeeded, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_skips_history() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(OkTransport {
            calls: AtomicU32::new(0),
        });
        let scheduler = SyncScheduler::new(store.clone(), transport, 100);

        scheduler.drain().await.unwrap();
        assert!(store.list_sync_records(10).await.unwrap().is_empty());
    }
}
