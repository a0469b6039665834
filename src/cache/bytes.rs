//! Byte-oriented key/value caches for the per-item tier.
//!
//! Two implementations:
//! - [`MemoryByteCache`] - TTL map in process memory
//! - [`DiskByteCache`] - one file per key under a cache directory
//!
//! Both expire entries by TTL only; neither bounds its size.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Byte-oriented cache contract.
#[async_trait]
pub trait ByteCache: Send + Sync {
    /// `Ok(None)` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Release resources; later calls fail with [`CacheError::Closed`].
    async fn close(&self) -> Result<(), CacheError>;
}

/// In-memory byte cache.
#[derive(Debug, Default)]
pub struct MemoryByteCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    closed: AtomicBool,
}

impl MemoryByteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ByteCache for MemoryByteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_open()?;
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((_, expires)) => *expires <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.check_open()?;
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_open()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        self.entries.lock().clear();
        Ok(())
    }
}

/// Disk byte cache.
///
/// Each entry is a file named after the SHA-256 of its key. The file starts
/// with the expiry as 8 big-endian bytes of Unix seconds, followed by the
/// payload. File I/O runs on the blocking pool.
#[derive(Debug)]
pub struct DiskByteCache {
    cache_dir: PathBuf,
    closed: AtomicBool,
}

impl DiskByteCache {
    /// Create a new cache in the specified directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a cache in the default location (user cache directory).
    pub fn default_location() -> Result<Self, CacheError> {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("music-search")
            .join("items");
        Self::new(cache_dir)
    }

    /// Delete every file whose entry has expired. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = unix_now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let expired = fs::read(&path)
                .ok()
                .and_then(|bytes| decode(&bytes).map(|(expires, _)| expires <= now))
                .unwrap_or(true);
            if expired && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Get the total size of the cache in bytes.
    pub fn size_bytes(&self) -> u64 {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.cache_dir.join(format!("{:x}.bin", hasher.finalize()))
    }

    fn check_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn decode(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let (header, payload) = bytes.split_at_checked(8)?;
    let expires = u64::from_be_bytes(header.try_into().ok()?);
    Some((expires, payload))
}

async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Io(e.to_string()))?
}

#[async_trait]
impl ByteCache for DiskByteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_open()?;
        let path = self.cache_path(key);
        blocking(move || {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            match decode(&bytes) {
                Some((expires, payload)) if expires > unix_now() => Ok(Some(payload.to_vec())),
                _ => {
                    // Expired or truncated: drop it lazily.
                    let _ = fs::remove_file(&path);
                    Ok(None)
                }
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.check_open()?;
        let path = self.cache_path(key);
        blocking(move || {
            let expires = unix_now().saturating_add(ttl.as_secs().max(1));
            let mut bytes = Vec::with_capacity(8 + value.len());
            bytes.extend_from_slice(&expires.to_be_bytes());
            bytes.extend_from_slice(&value);

            let temp_path = path.with_extension("tmp");
            fs::write(&temp_path, &bytes)?;
            fs::rename(&temp_path, &path)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_open()?;
        let path = self.cache_path(key);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let cache = MemoryByteCache::new();
        cache.set("k", b"value".to_vec(), HOUR).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"value".to_vec()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_expiry() {
        let cache = MemoryByteCache::new();
        cache.set("k", vec![1], Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_memory_closed() {
        let cache = MemoryByteCache::new();
        cache.close().await.unwrap();
        assert_eq!(cache.get("k").await, Err(CacheError::Closed));
    }

    #[tokio::test]
    async fn test_disk_put_and_get() {
        let temp = TempDir::new().unwrap();
        let cache = DiskByteCache::new(temp.path()).unwrap();

        cache.set("item:spotify:1", b"payload".to_vec(), HOUR).await.unwrap();
        assert_eq!(
            cache.get("item:spotify:1").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert!(cache.size_bytes() > 0);
    }

    #[tokio::test]
    async fn test_disk_miss_and_delete() {
        let temp = TempDir::new().unwrap();
        let cache = DiskByteCache::new(temp.path()).unwrap();

        assert_eq!(cache.get("nope").await.unwrap(), None);
        cache.delete("nope").await.unwrap();

        cache.set("k", vec![1, 2, 3], HOUR).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_purge_removes_corrupt_files() {
        let temp = TempDir::new().unwrap();
        let cache = DiskByteCache::new(temp.path()).unwrap();

        cache.set("good", vec![1], HOUR).await.unwrap();
        fs::write(temp.path().join("garbage.bin"), [0u8; 3]).unwrap();

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.get("good").await.unwrap(), Some(vec![1]));
    }
}
