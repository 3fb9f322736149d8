//! TTL cache with an injectable clock

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Time source for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Instant::now())
    }
}

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory cache whose entries expire after a TTL
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    /// Create cache with the wall clock
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    /// Get cached value if present and not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if self.clock.now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now() + ttl,
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), entry);
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Drop entries older than `max_age`, regardless of their own TTL
    pub fn invalidate_older_than(&self, max_age: Duration) {
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| {
                let inserted = e.expires_at.checked_sub(self.default_ttl).unwrap_or(e.expires_at);
                now.saturating_duration_since(inserted) <= max_age && now < e.expires_at
            });
        }
    }

    /// Clear expired entries
    pub fn cleanup(&self) {
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| now < e.expires_at);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let Ok(entries) = self.entries.read() else {
            return CacheStats::default();
        };
        let now = self.clock.now();
        let total = entries.len();
        let expired = entries.values().filter(|e| now >= e.expires_at).count();
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

/// Cache key for an embedding request
pub fn embedding_cache_key(model: &str, text: &str) -> String {
    let hash = blake3::hash(text.as_bytes());
    format!("embed:{}:{}", model, &hash.to_hex()[..32])
}
