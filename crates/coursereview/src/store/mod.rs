//! TTL-based key-value store backing OTPs, handshake state, rate limits and sessions.
//!
//! Mirrors the small subset of cache-server commands the application needs
//! (`SETEX`, `GET`, `GETDEL`, `INCR`, `EXPIRE`, `DEL`). Every command on a
//! single key is atomic because it runs under that key's DashMap shard lock.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `INCR` on a key holding something other than an integer
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
}

/// A stored value with its optional deadline.
#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |deadline| Instant::now() < deadline)
    }
}

/// Thread-safe key-value store with per-entry expiry.
#[derive(Default)]
pub struct TtlStore {
    entries: DashMap<String, Entry>,
}

impl TtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value and TTL.
    pub fn set_ex(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries
            .insert(key.into(), Entry::new(value.into(), Some(ttl)));
    }

    /// Gets a value if it exists and hasn't expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let lookup = self
            .entries
            .get(key)
            .map(|entry| entry.is_live().then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                // Entry expired, remove it
                self.entries.remove_if(key, |_, entry| !entry.is_live());
                None
            }
            None => None,
        }
    }

    /// Atomically reads and removes a value.
    ///
    /// Two concurrent callers can never both observe the same value.
    pub fn get_del(&self, key: &str) -> Option<String> {
        self.entries
            .remove(key)
            .and_then(|(_, entry)| entry.is_live().then_some(entry.value))
    }

    /// Atomically increments the integer at `key`.
    ///
    /// A missing or expired key counts as 0 and is recreated without a TTL.
    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_inner(key, None)
    }

    /// Increments the counter at `key` and, when this creates the counter,
    /// sets its TTL to `window`. Both steps happen under one entry lock.
    pub fn incr_with_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        self.incr_inner(key, Some(window))
    }

    fn incr_inner(&self, key: &str, window: Option<Duration>) -> Result<i64, StoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0".to_string(), None));

        if !entry.is_live() {
            *entry = Entry::new("0".to_string(), None);
        }

        let current: i64 = entry.value.parse().map_err(|_| StoreError::NotAnInteger {
            key: key.to_string(),
        })?;
        let next = current + 1;
        entry.value = next.to_string();

        if next == 1 {
            if let Some(window) = window {
                entry.expires_at = Some(Instant::now() + window);
            }
        }

        Ok(next)
    }

    /// Sets a TTL on an existing key. Returns false when the key is absent.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live() => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            _ => false,
        }
    }

    /// Removes a key. Returns whether a live value was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live())
    }

    /// Returns the number of entries in the store (including expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries from the store.
    ///
    /// Reads already skip expired entries; this only reclaims memory.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        before.saturating_sub(self.entries.len())
    }

    /// Gets store statistics.
    pub fn stats(&self) -> StoreStats {
        let mut total = 0;
        let mut expired = 0;

        for entry in self.entries.iter() {
            total += 1;
            if !entry.is_live() {
                expired += 1;
            }
        }

        StoreStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Store statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}
