//! TTL response cache keyed by normalized request signature
//!
//! Entries expire passively: lookups treat anything at or past its expiry as
//! absent, and a background sweep drops expired entries to bound memory.
//! An optional entry bound evicts the least recently used entry on insert.

use axum::http::Uri;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::debug;

use crate::{clock::Clock, config::CacheConfig};

/// Cache key for an inbound request: path plus its query pairs in sorted order
#[must_use]
pub fn request_signature(uri: &Uri) -> String {
    let path = uri.path();
    let Some(query) = uri.query().filter(|q| !q.is_empty()) else {
        return path.to_string();
    };

    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    pairs.sort_unstable();

    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, pairs.join("&"))
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
    last_access: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe response cache with per-entry TTL expiration
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    max_entries: Option<usize>,
    access_tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.len())
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl ResponseCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            default_ttl: seconds(config.default_ttl_seconds),
            max_entries: config.max_entries.filter(|max| *max > 0),
            access_tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a live entry; expired entries are removed and reported absent
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        // Expired entries go now rather than waiting for the sweep
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` under `key` with the default TTL
    pub fn set(&self, key: &str, value: Value) {
        self.insert(key, value, self.default_ttl);
    }

    /// Store `value` under `key`, expiring `ttl_seconds` from now
    pub fn set_with_ttl(&self, key: &str, value: Value, ttl_seconds: u64) {
        self.insert(key, value, seconds(ttl_seconds));
    }

    fn insert(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: self
                .clock
                .now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_access: AtomicU64::new(self.next_tick()),
        };
        self.entries.insert(key.to_string(), entry);

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                if !self.evict_least_recent(key) {
                    break;
                }
            }
        }
    }

    /// Evict the least recently used entry other than `keep`
    fn evict_least_recent(&self, keep: &str) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match victim {
            Some(victim) => {
                debug!("Evicting least recently used cache entry: {}", victim);
                self.entries.remove(&victim);
                true
            }
            None => false,
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn next_tick(&self) -> u64 {
        self.access_tick.fetch_add(1, Ordering::Relaxed)
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
