//! Read cache behind the query gateway.
//!
//! Values are stored as `serde_json::Value` so one cache serves every row
//! type. The trait is async so an out-of-process store can stand in for the
//! in-memory [`TtlCache`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// How long a cached read stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Key-value store for cached query results.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Return the live value for `key`, if any.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: Value);

    /// Drop every entry whose key contains `pattern`. Returns how many were removed.
    async fn invalidate_by_pattern(&self, pattern: &str) -> usize;

    /// Drop everything.
    async fn clear(&self);
}

// Compile-time check that QueryCache is object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn QueryCache) {}
};

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

struct CacheEntry {
    data: Value,
    expires_at: Instant,
}

/// Map size at which `set` first sweeps out expired entries.
const SWEEP_THRESHOLD: usize = 1024;

struct Entries {
    map: HashMap<String, CacheEntry>,
    /// `set` sweeps once the map reaches this size.
    sweep_at: usize,
}

impl Entries {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, e| e.expires_at > now);
        self.sweep_at = (self.map.len() * 2).max(SWEEP_THRESHOLD);
        before - self.map.len()
    }
}

/// In-process cache with a fixed time-to-live per entry.
///
/// Expired entries are dropped when read and swept in bulk by `set` as the
/// map grows, so keys that are never read again do not pile up.
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<Entries>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                sweep_at: SWEEP_THRESHOLD,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries that have not yet expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().map.values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl QueryCache for TtlCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.lock();
        match entries.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Value) {
        let now = Instant::now();
        let entry = CacheEntry {
            data: value,
            expires_at: now + self.ttl,
        };
        let mut entries = self.lock();
        if entries.map.len() >= entries.sweep_at {
            let swept = entries.sweep(now);
            if swept > 0 {
                debug!(swept, live = entries.map.len(), "swept expired cache entries");
            }
        }
        entries.map.insert(key.to_owned(), entry);
    }

    async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.map.len();
        entries.map.retain(|key, _| !key.contains(pattern));
        before - entries.map.len()
    }

    async fn clear(&self) {
        self.lock().map.clear();
    }
}
