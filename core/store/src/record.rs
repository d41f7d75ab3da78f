//! Persisted record types for the three durable collections.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use backhaul_common::{Method, Priority};

/// A single queued mutation awaiting replay.
///
/// Created when a write fails or is attempted while offline; mutated in
/// place (attempt count) on failed replay; deleted on success or when the
/// attempt budget is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique identifier, assigned at enqueue time.
    pub id: String,
    /// Caller-supplied label ("create-item", ...). Logging only, never
    /// interpreted by the engine.
    pub kind: String,
    /// Destination URL.
    pub target: String,
    /// Request method.
    pub method: Method,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Serialized payload, opaque to the engine.
    pub body: Option<Vec<u8>>,
    /// When the action was enqueued. FIFO tie-break within a priority class.
    pub enqueued_at: DateTime<Utc>,
    /// Execution attempts so far.
    pub attempts: u32,
    /// Maximum attempts, fixed from the priority at enqueue time.
    pub attempt_limit: u32,
    /// Scheduling class.
    pub priority: Priority,
}

impl PendingAction {
    /// Create a new pending action with a fresh id.
    ///
    /// The id carries a millisecond-timestamp prefix for log correlation
    /// and a random suffix so rapid enqueues cannot collide.
    pub fn new(
        kind: impl Into<String>,
        target: impl Into<String>,
        method: Method,
        headers: HashMap<String, String>,
        body: Option<Vec<u8>>,
        priority: Priority,
    ) -> Self {
        let enqueued_at = Utc::now();
        let suffix: u32 = rand::random();
        Self {
            id: format!("{}-{:06x}", enqueued_at.timestamp_millis(), suffix & 0xff_ffff),
            kind: kind.into(),
            target: target.into(),
            method,
            headers,
            body,
            enqueued_at,
            attempts: 0,
            attempt_limit: priority.attempt_limit(),
            priority,
        }
    }

    /// Record a failed attempt.
    pub fn mark_attempt_failed(&mut self) {
        self.attempts += 1;
    }

    /// Whether the attempt budget is spent. An exhausted action must never
    /// be retried again.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.attempt_limit
    }
}

/// A read-side snapshot with optional expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Unique identifier.
    pub id: String,
    /// Caller-defined read-data class.
    pub category: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
    /// Expiry instant, if any. An elapsed entry must never be returned by
    /// a read.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedEntry {
    /// Create an entry expiring `ttl` from now (or never, if `None`).
    pub fn new(
        category: impl Into<String>,
        payload: Vec<u8>,
        ttl: Option<std::time::Duration>,
    ) -> Self {
        let stored_at = Utc::now();
        let expires_at = ttl.and_then(|ttl| {
            Duration::from_std(ttl)
                .ok()
                .map(|ttl| stored_at + ttl)
        });
        Self {
            id: Uuid::new_v4().to_string(),
            category: category.into(),
            payload,
            stored_at,
            expires_at,
        }
    }

    /// Whether the entry has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A permanently failed action, as reported in a [`SyncRecord`].
///
/// References the action id as an opaque string only; the action itself is
/// already gone from the store by the time this is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailure {
    pub action_id: String,
    pub reason: String,
}

/// The record of one scheduler drain. Append-only; observability only,
/// never read back into scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Actions delivered and removed from the queue.
    pub succeeded: usize,
    /// Actions dropped after exhausting their attempt budget.
    pub failed: usize,
    /// The terminally failed actions.
    pub failures: Vec<ActionFailure>,
    /// When the drain ran.
    pub ran_at: DateTime<Utc>,
}

impl SyncRecord {
    /// An empty record for a drain that found nothing to do.
    pub fn empty() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            ran_at: Utc::now(),
        }
    }
}
