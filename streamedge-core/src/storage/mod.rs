// Durable fragment storage
//
// Pure key-value byte store behind the disk tier. The store knows nothing
// about streams, TTLs or tiers; it only promises that a reader never sees a
// partially written value.

pub mod file;

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Result;
use std::time::Duration;

/// Byte-addressable durable store
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Read the value under `key`
    ///
    /// Returns `ErrorKind::NotFound` when nothing is stored.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Store `data` under `key`, replacing any previous value atomically
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete values written longer ago than `older_than`
    ///
    /// Returns the number of values removed. No-op by default.
    async fn cleanup(&self, _older_than: Duration) -> Result<usize> {
        Ok(0)
    }
}

pub use file::FileStore;
