//! Backhaul Offline Engine
//!
//! This module keeps a disconnected client productive, including:
//! - A durable action queue replayed in priority + arrival order
//! - Network reachability tracking with connectivity fan-out
//! - A drain scheduler with a single-drain mutual-exclusion guard
//! - Bounded retry budgets per priority class
//! - An expiring read-side cache for offline consumption
//! - A request façade that queues writes and serves cached reads offline

pub mod cache;
pub mod engine;
pub mod facade;
pub mod monitor;
pub mod queue;
pub mod scheduler;
pub mod transport;

// Re-export main types
pub use cache::CacheLayer;
pub use engine::{EngineConfig, EngineStatus, SyncEngine};
pub use facade::{OfflinePolicy, RequestFacade, Submission};
pub use monitor::{NetworkMonitor, SubscriptionId};
pub use queue::ActionQueue;
pub use scheduler::{SyncScheduler, TriggerOutcome};
pub use transport::{HttpTransport, Request, Response, Transport};
