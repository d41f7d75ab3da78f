//! In-memory durable store for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use backhaul_common::Result;

use crate::record::{CachedEntry, PendingAction, SyncRecord};
use crate::store::DurableStore;

/// In-memory store implementation.
///
/// Useful for testing and development. Satisfies the [`DurableStore`]
/// contract except actual durability: all data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    actions: RwLock<HashMap<String, PendingAction>>,
    cache: RwLock<HashMap<String, CachedEntry>>,
    log: RwLock<Vec<SyncRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put_action(&self, action: &PendingAction) -> Result<()> {
        self.actions
            .write()
            .unwrap()
            .insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<PendingAction>> {
        Ok(self.actions.read().unwrap().get(id).cloned())
    }

    async fn delete_action(&self, id: &str) -> Result<()> {
        self.actions.write().unwrap().remove(id);
        Ok(())
    }

    async fn list_actions(&self) -> Result<Vec<PendingAction>> {
        Ok(self.actions.read().unwrap().values().cloned().collect())
    }

    async fn put_cached(&self, entry: &CachedEntry) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_cached(&self, category: Option<&str>) -> Result<Vec<CachedEntry>> {
        let cache = self.cache.read().unwrap();
        Ok(cache
            .values()
            .filter(|e| category.is_none_or(|c| e.category == c))
            .cloned()
            .collect())
    }

    async fn delete_cached(&self, id: &str) -> Result<()> {
        self.cache.write().unwrap().remove(id);
        Ok(())
    }

    async fn delete_expired_cached(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut cache = self.cache.write().unwrap();
        let before = cache.len();
        cache.retain(|_, e| !e.is_expired(now));
        Ok(before - cache.len())
    }

    async fn append_sync_record(&self, record: &SyncRecord) -> Result<()> {
        self.log.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_sync_records(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        let log = self.log.read().unwrap();
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    async fn prune_sync_records(&self, keep: usize) -> Result<usize> {
        let mut log = self.log.write().unwrap();
        let excess = log.len().saturating_sub(keep);
        log.drain(..excess);
        Ok(excess)
    }
}
