//! TTL cache for parsed source maps.
//!
//! Expiry is checked on access only; there is no background sweeper, so
//! an entry that is never touched again stays in memory (bounded
//! staleness, acceptable for this access pattern). Nothing here is
//! internally synchronized: callers serialize access per key, and
//! concurrent writers to one key get last-write-wins.

use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;

use super::ParsedSourceMap;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// One parsed map plus the wall-clock instant it was cached at.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    map: ParsedSourceMap,
    cached_at_millis: u64,
}

impl CacheEntry {
    pub fn new(map: ParsedSourceMap) -> Self {
        Self {
            map,
            cached_at_millis: now_millis(),
        }
    }

    pub fn is_expired(&self, ttl_millis: u64) -> bool {
        now_millis().saturating_sub(self.cached_at_millis) > ttl_millis
    }

    pub fn map(&self) -> &ParsedSourceMap {
        &self.map
    }
}

/// Parsed source maps keyed by generated-file name.
#[derive(Debug)]
pub struct SourceMapCache {
    ttl_millis: u64,
    entries: FxHashMap<String, CacheEntry>,
}

impl SourceMapCache {
    pub fn new(ttl_millis: u64) -> Self {
        Self {
            ttl_millis,
            entries: FxHashMap::default(),
        }
    }

    /// Fetch a cached map, lazily dropping it once past the TTL.
    pub fn get(&mut self, key: &str) -> Option<&ParsedSourceMap> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(self.ttl_millis))
        {
            tracing::debug!(key, "evicting expired source map");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(CacheEntry::map)
    }

    pub fn insert(&mut self, key: impl Into<String>, map: ParsedSourceMap) {
        self.entries.insert(key.into(), CacheEntry::new(map));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
