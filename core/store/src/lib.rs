//! Backhaul Durable Store
//!
//! Persistence layer for the offline engine's three collections:
//! - Pending actions (the offline mutation queue)
//! - Cached read-side entries with expiration
//! - The append-only sync-history log
//!
//! The [`DurableStore`] trait is the seam: [`MemoryStore`] backs tests and
//! ephemeral embedders, [`SqliteStore`] is the production implementation.

pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use record::{ActionFailure, CachedEntry, PendingAction, SyncRecord};
pub use sqlite::SqliteStore;
pub use store::DurableStore;
