// Memory tier: bounded LRU over fragment bytes
//
// Recency is the order inside `LruCache`; a hit moves the entry to the front.
// Inserting into a full cache evicts exactly the least recently used entry.
// The lock is never held across an await.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

use super::CacheTier;
use crate::error::FetchResult;
use crate::fragment::FragmentKey;
use crate::metrics;

const TIER: &str = "memory";

pub struct MemoryLruTier {
    entries: Mutex<LruCache<FragmentKey, Bytes>>,
    next: Box<CacheTier>,
}

impl MemoryLruTier {
    #[must_use]
    pub fn new(capacity: NonZeroUsize, next: CacheTier) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            next: Box::new(next),
        }
    }

    pub async fn fetch(&self, key: &FragmentKey) -> FetchResult<Bytes> {
        if let Some(bytes) = self.get(key) {
            metrics::cache::TIER_HITS.with_label_values(&[TIER]).inc();
            trace!(key = %key, "Memory hit");
            return Ok(bytes);
        }
        metrics::cache::TIER_MISSES.with_label_values(&[TIER]).inc();

        let bytes = self.next.fetch(key).await?;
        self.insert(key.clone(), bytes.clone());
        Ok(bytes)
    }

    /// Look up and mark as most recently used
    pub(crate) fn get(&self, key: &FragmentKey) -> Option<Bytes> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert as most recently used, evicting the LRU entry when full
    pub(crate) fn insert(&self, key: FragmentKey, bytes: Bytes) {
        let evicted = self.entries.lock().push(key.clone(), bytes);

        // `push` also hands back the old value when the key was present
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                metrics::cache::MEMORY_EVICTIONS.inc();
                debug!(evicted = %evicted_key, inserted = %key, "Memory tier evicted LRU entry");
            }
        }
    }

    /// Presence check that leaves recency untouched
    #[must_use]
    pub fn contains(&self, key: &FragmentKey) -> bool {
        self.entries.lock().contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    #[cfg(test)]
    pub(crate) fn next(&self) -> &CacheTier {
        &self.next
    }
}
