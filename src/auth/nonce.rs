//! Replay cache for signed request nonces

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// One accepted `(client, nonce)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    /// `client_id + ":" + nonce`
    pub key: String,
    pub expires_at_secs: i64,
}

impl NonceRecord {
    pub fn composite_key(client_id: &str, nonce: &str) -> String {
        format!("{}:{}", client_id, nonce)
    }

    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.expires_at_secs <= now_secs
    }
}

/// Store of nonces that have already been accepted
pub trait ReplayCache: Send + Sync {
    /// Live record for `key`, if any
    fn get(&self, key: &str, now_secs: i64) -> Option<NonceRecord>;

    /// Record `key` unless a live record exists; returns false if it was already present
    fn put(&self, record: NonceRecord, now_secs: i64) -> bool;

    /// Drop expired records; returns how many were removed
    fn sweep_expired(&self, now_secs: i64) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// LRU-bounded [`ReplayCache`]
///
/// Every record gets the same lifetime, so insertion order is expiry order
/// and sweeping only ever pops from the least recently inserted end. Lookups
/// use `peek` to keep that ordering intact.
pub struct LruReplayCache {
    entries: Mutex<LruCache<String, i64>>,
}

impl LruReplayCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl ReplayCache for LruReplayCache {
    fn get(&self, key: &str, now_secs: i64) -> Option<NonceRecord> {
        let entries = self.entries.lock();
        entries
            .peek(key)
            .filter(|expires_at| **expires_at > now_secs)
            .map(|expires_at| NonceRecord {
                key: key.to_string(),
                expires_at_secs: *expires_at,
            })
    }

    fn put(&self, record: NonceRecord, now_secs: i64) -> bool {
        let mut entries = self.entries.lock();
        if let Some(expires_at) = entries.peek(&record.key)
            && *expires_at > now_secs
        {
            return false;
        }
        entries.put(record.key, record.expires_at_secs);
        true
    }

    fn sweep_expired(&self, now_secs: i64) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        while let Some((_, expires_at)) = entries.peek_lru() {
            if *expires_at > now_secs {
                break;
            }
            entries.pop_lru();
            removed += 1;
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
