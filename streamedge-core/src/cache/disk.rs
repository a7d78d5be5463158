// Disk tier: write-through cache over a FragmentStore
//
// I/O failures stay inside this tier. A failed read is treated as a miss and
// the fetch continues below; a failed write is logged and the bytes from
// below are still returned to the caller.

use bytes::Bytes;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{trace, warn};

use super::CacheTier;
use crate::error::FetchResult;
use crate::fragment::FragmentKey;
use crate::metrics;
use crate::storage::FragmentStore;

const TIER: &str = "disk";

pub struct DiskTier {
    store: Arc<dyn FragmentStore>,
    next: Box<CacheTier>,
}

impl DiskTier {
    #[must_use]
    pub fn new(store: Arc<dyn FragmentStore>, next: CacheTier) -> Self {
        Self {
            store,
            next: Box::new(next),
        }
    }

    pub async fn fetch(&self, key: &FragmentKey) -> FetchResult<Bytes> {
        let storage_key = key.storage_key();

        // Skip write-through when the store already failed us on this fetch
        let store_healthy = match self.store.read(&storage_key).await {
            Ok(bytes) => {
                metrics::cache::TIER_HITS.with_label_values(&[TIER]).inc();
                trace!(key = %key, "Disk hit");
                return Ok(bytes);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                metrics::cache::DISK_IO_FAILURES
                    .with_label_values(&["read"])
                    .inc();
                warn!(key = %key, error = %e, "Disk read failed, falling through");
                false
            }
        };
        metrics::cache::TIER_MISSES.with_label_values(&[TIER]).inc();

        let bytes = self.next.fetch(key).await?;

        if store_healthy {
            if let Err(e) = self.store.write(&storage_key, bytes.clone()).await {
                metrics::cache::DISK_IO_FAILURES
                    .with_label_values(&["write"])
                    .inc();
                warn!(key = %key, error = %e, "Disk write-through failed");
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamRegistry;
    use crate::storage::FileStore;
    use crate::test_helpers::{origin_tier, MockOrigin};
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Store whose every operation fails with a permission error
    #[derive(Default)]
    struct BrokenStore {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl FragmentStore for BrokenStore {
        async fn read(&self, _key: &str) -> io::Result<Bytes> {
            Err(io::Error::new(ErrorKind::PermissionDenied, "read denied"))
        }

        async fn write(&self, _key: &str, _data: Bytes) -> io::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(ErrorKind::PermissionDenied, "write denied"))
        }

        async fn exists(&self, _key: &str) -> io::Result<bool> {
            Ok(false)
        }
    }

    /// Empty store that cannot persist anything
    struct ReadOnlyStore;

    #[async_trait]
    impl FragmentStore for ReadOnlyStore {
        async fn read(&self, _key: &str) -> io::Result<Bytes> {
            Err(io::Error::from(ErrorKind::NotFound))
        }

        async fn write(&self, _key: &str, _data: Bytes) -> io::Result<()> {
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        }

        async fn exists(&self, _key: &str) -> io::Result<bool> {
            Ok(false)
        }
    }

    fn setup(store: Arc<dyn FragmentStore>) -> (DiskTier, Arc<MockOrigin>) {
        let registry = Arc::new(StreamRegistry::new(Duration::from_secs(15)));
        registry.update("camA", "http://10.0.0.5", "seg5.ts");
        let origin = MockOrigin::new();
        origin.put("http://10.0.0.5", "seg5.ts", b"seg5-bytes");
        let next = origin_tier(&registry, &origin, Duration::from_secs(2));
        (DiskTier::new(store, next), origin)
    }

    #[tokio::test]
    async fn test_miss_writes_through() {
        let temp_dir = tempdir().unwrap();
        let store: Arc<dyn FragmentStore> = Arc::new(FileStore::open(temp_dir.path()).await.unwrap());
        let (tier, origin) = setup(store.clone());
        let key = FragmentKey::new("camA", "seg5.ts");

        assert_eq!(tier.fetch(&key).await.unwrap(), Bytes::from_static(b"seg5-bytes"));
        assert_eq!(
            store
                .read(&FragmentKey::new("camA", "seg5.ts").storage_key())
                .await
                .unwrap(),
            Bytes::from_static(b"seg5-bytes")
        );

        assert_eq!(tier.fetch(&key).await.unwrap(), Bytes::from_static(b"seg5-bytes"));
        assert_eq!(origin.downloads(), 1);
    }

    #[tokio::test]
    async fn test_hit_does_not_reach_origin() {
        let temp_dir = tempdir().unwrap();
        let store: Arc<dyn FragmentStore> = Arc::new(FileStore::open(temp_dir.path()).await.unwrap());
        store
            .write(
                &FragmentKey::new("camA", "seg9.ts").storage_key(),
                Bytes::from_static(b"on-disk"),
            )
            .await
            .unwrap();
        let (tier, origin) = setup(store);

        let bytes = tier.fetch(&FragmentKey::new("camA", "seg9.ts")).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"on-disk"));
        assert_eq!(origin.downloads(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_falls_through_without_write() {
        let store = Arc::new(BrokenStore::default());
        let (tier, origin) = setup(store.clone());

        let bytes = tier.fetch(&FragmentKey::new("camA", "seg5.ts")).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"seg5-bytes"));
        assert_eq!(origin.downloads(), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_bytes() {
        let (tier, _) = setup(Arc::new(ReadOnlyStore));

        let bytes = tier.fetch(&FragmentKey::new("camA", "seg5.ts")).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"seg5-bytes"));
    }
}
