//! Process-local TTL cache
//!
//! Expiry is evaluated on access, and expired entries are swept every
//! `PRUNE_EVERY_WRITES` writes so keys that are never read again do not pile
//! up. The clock can be advanced manually so idle-expiry behavior is testable
//! without sleeping.

use crate::{CacheError, CacheOperations, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Writes between sweeps of expired entries
const PRUNE_EVERY_WRITES: u64 = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache with per-entry expiry
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    /// Manual clock offset in milliseconds
    offset_ms: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            offset_ms: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Must not be called while holding an entry guard
    fn note_write(&self) {
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % PRUNE_EVERY_WRITES == 0 {
            self.purge_expired();
        }
    }

    /// Move the cache clock forward
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn now(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn expiry(&self, ttl_secs: u64) -> Instant {
        self.now() + Duration::from_secs(ttl_secs)
    }
}

#[async_trait]
impl CacheOperations for InMemoryCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        let expires_at = self.expiry(ttl_secs);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        self.note_write();
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64> {
        let now = self.now();
        let expires_at = self.expiry(ttl_secs);

        let next = {
            // The entry guard holds the shard lock, so read-modify-write is atomic
            let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
                value: "0".to_string(),
                expires_at,
            });
            let current = if entry.expires_at > now {
                entry.value.parse::<i64>().map_err(|_| {
                    CacheError::InvalidData(format!("value at {} is not an integer", key))
                })?
            } else {
                0
            };

            let next = current + delta;
            entry.value = next.to_string();
            entry.expires_at = expires_at;
            next
        };
        self.note_write();
        Ok(next)
    }
}
