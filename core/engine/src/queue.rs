//! Durable action queue with priority + arrival ordering.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use backhaul_common::{Method, Priority, Result};
use backhaul_store::{DurableStore, PendingAction};

/// The pending-mutation queue over the durable store.
///
/// The store holds the actions unordered; this type owns the replay
/// order: `(priority descending, enqueued_at ascending)`. Operators rely
/// on that exact total order for predictable replay of time-sensitive
/// writes, so a critical action enqueued last still runs first, and
/// within a class the queue is strict FIFO.
#[derive(Clone)]
pub struct ActionQueue {
    store: Arc<dyn DurableStore>,
}

impl ActionQueue {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Persist a new pending action and return its id.
    ///
    /// The attempt limit is fixed from `priority` here; a later policy
    /// change never affects actions already queued.
    pub async fn enqueue(
        &self,
        kind: impl Into<String>,
        target: impl Into<String>,
        method: Method,
        headers: HashMap<String, String>,
        body: Option<Vec<u8>>,
        priority: Priority,
    ) -> Result<String> {
        let action = PendingAction::new(kind, target, method, headers, body, priority);
        self.store.put_action(&action).await?;
        info!(
            id = %action.id,
            kind = %action.kind,
            priority = %action.priority,
            "Action queued"
        );
        Ok(action.id)
    }

    /// All pending actions in replay order.
    pub async fn pending(&self) -> Result<Vec<PendingAction>> {
        let mut actions = self.store.list_actions().await?;
        actions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(actions)
    }

    /// Number of pending actions.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.list_actions().await?.len())
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
