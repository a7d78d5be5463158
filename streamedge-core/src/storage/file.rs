// Filesystem fragment store
//
// Keys ("camA/seg5.ts") are hashed with SHA256 and stored flat under the
// root directory, so arbitrary stream and fragment names can never escape it.
//
// Writes go to a uniquely named temp file in the same directory and are then
// renamed over the final name. Rename within one filesystem is atomic, so a
// concurrent reader sees either the old file, the new one, or none.

use super::FragmentStore;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

const TEMP_SUFFIX: &str = ".tmp";

/// Check if a filename matches the SHA256 hex hash pattern (exactly 64 hex chars).
/// Cleanup only touches such files, so a misconfigured root cannot lose unrelated data.
fn is_sha256_filename(name: &str) -> bool {
    name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Temp files look like ".{sha256}.{uuid}.tmp"
fn is_temp_filename(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(TEMP_SUFFIX))
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(hash, _)| is_sha256_filename(hash))
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File system fragment store
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!("Fragment store opened at {:?}", root);
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hash_key(key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(
            ".{}.{}{TEMP_SUFFIX}",
            hash_key(key),
            uuid::Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl FragmentStore for FileStore {
    async fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key);
        let data = fs::read(&path).await?;

        tracing::trace!("Read: {:?} ({} bytes) for key: {}", path, data.len(), key);

        Ok(Bytes::from(data))
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key);
        let temp_path = self.temp_path_for(key);
        let size = data.len();

        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tracing::trace!("Wrote: {:?} ({} bytes) for key: {}", path, size, key);

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.path_for(key)).await
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            tracing::debug!("Cleanup root does not exist: {:?}", self.root);
            return Ok(0);
        }

        let cutoff_time = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut deleted = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !is_sha256_filename(&file_name) && !is_temp_filename(&file_name) {
                continue;
            }

            let path = entry.path();
            let Ok(modified) = fs::metadata(&path).await.and_then(|m| m.modified()) else {
                continue;
            };
            if modified < cutoff_time && fs::remove_file(&path).await.is_ok() {
                deleted += 1;
                tracing::trace!("Deleted expired file: {:?}", path);
            }
        }

        if deleted > 0 {
            tracing::info!(
                "Cleanup completed: scanned {:?}, deleted {} files older than {:?}",
                self.root,
                deleted,
                older_than
            );
        }

        Ok(deleted)
    }
}
