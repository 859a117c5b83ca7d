//! Bounded, time-limited dedup cache for gossip messages.
//!
//! Keys are the full serialized message. An entry counts as "seen" until
//! its TTL passes or it is evicted by newer entries.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use hashlink::LruCache;

/// LRU set of recently seen messages.
pub struct MessageCache {
    entries: Mutex<LruCache<String, Instant>>,
    ttl: Duration,
}

impl MessageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity.max(1))),
            ttl,
        }
    }

    /// Record `key` as seen. Returns true if it was not already present
    /// (or its previous sighting has expired).
    pub fn insert_if_new(&self, key: &str) -> bool {
        self.insert_if_new_at(key, Instant::now())
    }

    fn insert_if_new_at(&self, key: &str, now: Instant) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            // A poisoned cache only loses dedup, never messages.
            return true;
        };
        if let Some(seen_at) = entries.get(key)
            && now.duration_since(*seen_at) < self.ttl
        {
            return false;
        }
        entries.insert(key.to_string(), now);
        true
    }

    /// Number of entries currently held (expired ones included).
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
