//! Read-side cache with per-entry expiration.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use backhaul_common::Result;
use backhaul_store::{CachedEntry, DurableStore};

/// Expiring snapshots of read data, used to answer reads while offline.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn DurableStore>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Store a snapshot under `category`, expiring after `ttl` if given.
    /// Returns the entry id.
    pub async fn store(
        &self,
        category: impl Into<String>,
        payload: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let entry = CachedEntry::new(category, payload, ttl);
        self.store.put_cached(&entry).await?;
        Ok(entry.id)
    }

    /// Non-expired payloads, optionally restricted to one category.
    ///
    /// Expired rows are filtered here even though the sweep also deletes
    /// them: reads and sweeps are not mutually exclusive, so a read must
    /// never trust the store to have swept already.
    pub async fn fetch(&self, category: Option<&str>) -> Result<Vec<Vec<u8>>> {
        let now = Utc::now();
        let entries = self.store.list_cached(category).await?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.payload)
            .collect())
    }

    /// Delete entries whose expiry has elapsed. Returns how many were
    /// removed. Runs on its own interval, independent of the sync
    /// scheduler.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let removed = self.store.delete_expired_cached(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        Ok(removed)
    }
}
