//! In-memory TTL cache for the `/api/stats` aggregate (spec §6
//! "cacheable aggregate totals").
//!
//! Grounded on the teacher's `server/cache.rs` `CacheEntry<T>` pattern
//! (value + expiry, `RwLock`-guarded), narrowed from several
//! independently-cached document-stat shapes down to the one cacheable
//! aggregate this surface defines.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct StatsCache {
    slot: RwLock<Option<Entry>>,
    ttl: Duration,
}

impl StatsCache {
    pub fn new() -> Self {
        StatsCache { slot: RwLock::new(None), ttl: DEFAULT_TTL }
    }

    pub fn get(&self) -> Option<Value> {
        let guard = self.slot.read().unwrap();
        guard.as_ref().filter(|e| Instant::now() < e.expires_at).map(|e| e.value.clone())
    }

    pub fn set(&self, value: Value) {
        let mut guard = self.slot.write().unwrap();
        *guard = Some(Entry { value, expires_at: Instant::now() + self.ttl });
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}
