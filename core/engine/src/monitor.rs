//! Network reachability tracking and connectivity fan-out.
//!
//! How reachability is probed is a collaborator concern (platform
//! connectivity events, a health-endpoint poller); the monitor only owns
//! the transition semantics: one event per actual change, never a
//! duplicate "online" while already online.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Callback invoked with the new reachability on every transition.
pub type ConnectivityListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`NetworkMonitor::subscribe`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observer registry over a boolean reachability state.
pub struct NetworkMonitor {
    online: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, ConnectivityListener>>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial reachability.
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Current reachability.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Register a listener for connectivity transitions.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Remove a listener. Removing an already-removed listener is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().unwrap().remove(&id.0);
    }

    /// Report the observed reachability.
    ///
    /// Emits exactly one notification per actual transition; repeated
    /// identical states are ignored. Listeners are invoked on a snapshot
    /// of the registry, so subscribing or unsubscribing from inside a
    /// listener cannot deadlock the fan-out.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous == online {
            debug!(online, "Reachability unchanged; no event");
            return;
        }

        info!(online, "Connectivity transition");
        let snapshot: Vec<ConnectivityListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in snapshot {
            listener(online);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}
