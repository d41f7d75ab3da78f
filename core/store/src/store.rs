//! Durable store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use backhaul_common::Result;

use crate::record::{CachedEntry, PendingAction, SyncRecord};

/// Transactional persistence for the three engine collections: pending
/// actions, cached read data, and the sync-history log.
///
/// A successful `put`/`delete` for a given id is durable before the call
/// returns; a process interrupted mid-sync resumes from the last completed
/// single-record operation, never a half-applied one. Failures surface as
/// [`backhaul_common::Error::Storage`] and are never swallowed.
///
/// Ordering of [`list_actions`](DurableStore::list_actions) is
/// unspecified; the action queue applies the replay order itself.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or overwrite a pending action by id.
    async fn put_action(&self, action: &PendingAction) -> Result<()>;

    /// Fetch a pending action by id.
    async fn get_action(&self, id: &str) -> Result<Option<PendingAction>>;

    /// Delete a pending action. Deleting an absent id is a no-op.
    async fn delete_action(&self, id: &str) -> Result<()>;

    /// All pending actions, in no particular order.
    async fn list_actions(&self) -> Result<Vec<PendingAction>>;

    /// Insert or overwrite a cached entry by id.
    async fn put_cached(&self, entry: &CachedEntry) -> Result<()>;

    /// Cached entries, optionally restricted to one category.
    ///
    /// Returns raw rows including expired ones; expiry filtering belongs
    /// to the cache layer so reads stay correct while a sweep is in flight.
    async fn list_cached(&self, category: Option<&str>) -> Result<Vec<CachedEntry>>;

    /// Delete a cached entry. Deleting an absent id is a no-op.
    async fn delete_cached(&self, id: &str) -> Result<()>;

    /// Delete every cached entry whose expiry has elapsed as of `now`.
    /// Returns the number of entries removed.
    async fn delete_expired_cached(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Append one drain record to the sync-history log.
    async fn append_sync_record(&self, record: &SyncRecord) -> Result<()>;

    /// The most recent drain records, newest first.
    async fn list_sync_records(&self, limit: usize) -> Result<Vec<SyncRecord>>;

    /// Drop history beyond the newest `keep` records. Returns the number
    /// of records removed.
    async fn prune_sync_records(&self, keep: usize) -> Result<usize>;
}
