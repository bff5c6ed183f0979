//! Time-bound cache store shared by every consumer of a [`Client`](crate::Client).
//!
//! Entries expire lazily: an entry older than its `fresh_for` window is evicted
//! the first time it is read, and there is no background sweep. The store never
//! emits notifications; invalidation is handled by the subscription layer.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// A cached entry with the time it was stored and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub fresh_for: Duration,
}

impl<T> CacheEntry<T> {
    /// Creates a new cache entry stored now.
    pub fn new(value: T, fresh_for: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            fresh_for,
        }
    }

    /// Returns `true` while `now - stored_at < fresh_for`.
    ///
    /// A zero `fresh_for` makes the entry stale immediately.
    pub fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.fresh_for
    }
}

/// Key/value store with per-entry freshness.
///
/// Access to a single key is serialized by the underlying [`DashMap`] shard
/// lock. Writes are last-write-wins.
#[derive(Debug)]
pub struct CacheStore<T = Value> {
    entries: DashMap<String, CacheEntry<T>>,
}

impl<T: Clone> CacheStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the stored value if it is still fresh.
    ///
    /// A stale entry is removed as a side effect of the read.
    pub fn get(&self, key: &str) -> Option<T> {
        {
            let entry = self.entries.get(key)?;
            if entry.is_fresh() {
                return Some(entry.value.clone());
            }
        }

        // Re-check under the write lock: another writer may have refreshed it.
        if self.entries.remove_if(key, |_, entry| !entry.is_fresh()).is_some() {
            debug!(key, "evicted stale cache entry");
        }
        None
    }

    /// Stores `value` under `key`, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: T, fresh_for: Duration) {
        self.entries
            .insert(key.into(), CacheEntry::new(value, fresh_for));
    }

    /// Removes the entry for `key`. Absent keys are ignored.
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries currently held, including stale entries not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl<T: Clone> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
