//! key/value interface for contract metadata plus a write-once shard blob.
//!
//! Every key is a 40-character lowercase hex `data_hash`. That hash is the
//! metadata key; shard bytes for it live under a secondary key,
//! `RIPEMD160(data_hash)`, so the blob store and the key-derivation rule can
//! evolve independently of the human-readable hash callers pass around.
//! Shard bytes are written exactly once: an adapter must refuse a second
//! `write_shard` for a key that already has bytes on disk.

use async_trait::async_trait;
use ripemd::{Digest, Ripemd160};

use crate::error::{validate_key, Result};
use crate::item::StorageItem;

/// derives the secondary key shard bytes are actually stored under.
pub(crate) fn shard_key(hash: &str) -> String {
    hex::encode(Ripemd160::digest(hash.as_bytes()))
}

/// whether the shard bytes behind a key can be read (already present) or
/// must still be written (absent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardAccess {
    Readable,
    Writable,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// item metadata only; never touches shard bytes.
    async fn peek(&self, key: &str) -> Result<Option<StorageItem>>;

    /// item metadata plus whether its shard bytes are readable or still need
    /// to be written.
    async fn get(&self, key: &str) -> Result<Option<(StorageItem, ShardAccess)>>;

    /// persist metadata. the item's shard bytes, if any, are carried
    /// separately through [`StorageAdapter::write_shard`]; this method never
    /// touches them.
    async fn put(&self, key: &str, item: StorageItem) -> Result<()>;

    /// remove metadata and shard bytes for `key`.
    async fn del(&self, key: &str) -> Result<()>;

    /// approximate total bytes consumed by metadata + shard storage.
    async fn size(&self) -> Result<u64>;

    /// all metadata keys currently stored.
    async fn keys(&self) -> Result<Vec<String>>;

    /// read the full shard byte stream for `key`.
    async fn read_shard(&self, key: &str) -> Result<Vec<u8>>;

    /// write the shard byte stream for `key`, once. fails if shard bytes for
    /// `key` already exist.
    async fn write_shard(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// a conforming adapter exposes a read stream over items: for each key, peek
/// its metadata without opening the shard stream. errors mid-stream
/// terminate the whole walk.
pub async fn read_all(adapter: &dyn StorageAdapter) -> Result<Vec<StorageItem>> {
    let mut items = Vec::new();
    for key in adapter.keys().await? {
        if let Some(item) = adapter.peek(&key).await? {
            items.push(item);
        }
    }
    Ok(items)
}

pub(crate) fn check_key(key: &str) -> Result<()> {
    validate_key(key)
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{check_key, shard_key, ShardAccess, StorageAdapter};
    use crate::error::{Result, StorageError};
    use crate::item::StorageItem;

    #[derive(Default)]
    pub struct MemoryAdapter {
        items: Mutex<HashMap<String, StorageItem>>,
        shards: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryAdapter {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl StorageAdapter for MemoryAdapter {
        async fn peek(&self, key: &str) -> Result<Option<StorageItem>> {
            check_key(key)?;
            Ok(self.items.lock().unwrap().get(key).cloned())
        }

        async fn get(&self, key: &str) -> Result<Option<(StorageItem, ShardAccess)>> {
            check_key(key)?;
            let item = self.items.lock().unwrap().get(key).cloned();
            let Some(item) = item else { return Ok(None) };
            let access = if self.shards.lock().unwrap().contains_key(&shard_key(key)) {
                ShardAccess::Readable
            } else {
                ShardAccess::Writable
            };
            Ok(Some((item, access)))
        }

        async fn put(&self, key: &str, item: StorageItem) -> Result<()> {
            check_key(key)?;
            self.items.lock().unwrap().insert(key.to_string(), item);
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<()> {
            check_key(key)?;
            self.items.lock().unwrap().remove(key);
            self.shards.lock().unwrap().remove(&shard_key(key));
            Ok(())
        }

        async fn size(&self) -> Result<u64> {
            let shard_bytes: u64 = self.shards.lock().unwrap().values().map(|v| v.len() as u64).sum();
            let meta_bytes: u64 = self
                .items
                .lock()
                .unwrap()
                .values()
                .map(|item| serde_json::to_vec(item).map(|v| v.len() as u64).unwrap_or(0))
                .sum();
            Ok(shard_bytes + meta_bytes)
        }

        async fn keys(&self) -> Result<Vec<String>> {
            Ok(self.items.lock().unwrap().keys().cloned().collect())
        }

        async fn read_shard(&self, key: &str) -> Result<Vec<u8>> {
            check_key(key)?;
            self.shards
                .lock()
                .unwrap()
                .get(&shard_key(key))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        async fn write_shard(&self, key: &str, bytes: &[u8]) -> Result<()> {
            check_key(key)?;
            let mut shards = self.shards.lock().unwrap();
            let secondary = shard_key(key);
            if shards.contains_key(&secondary) {
                return Err(StorageError::ShardAlreadyWritten(key.to_string()));
            }
            shards.insert(secondary, bytes.to_vec());
            Ok(())
        }
    }
}

pub mod fs {
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    use super::{check_key, shard_key, ShardAccess, StorageAdapter};
    use crate::error::{Result, StorageError};
    use crate::item::StorageItem;

    /// an on-disk adapter: `<root>/meta/<key>.json` for metadata,
    /// `<root>/shard/<RIPEMD160(key)>` for raw shard bytes.
    pub struct FsAdapter {
        root: PathBuf,
    }

    impl FsAdapter {
        pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
            let root = root.into();
            tokio::fs::create_dir_all(root.join("meta")).await?;
            tokio::fs::create_dir_all(root.join("shard")).await?;
            Ok(Self { root })
        }

        fn meta_path(&self, key: &str) -> PathBuf {
            self.root.join("meta").join(format!("{key}.json"))
        }

        fn shard_path(&self, key: &str) -> PathBuf {
            self.root.join("shard").join(shard_key(key))
        }
    }

    async fn dir_size(path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            total += entry.metadata().await?.len();
        }
        Ok(total)
    }

    #[async_trait]
    impl StorageAdapter for FsAdapter {
        async fn peek(&self, key: &str) -> Result<Option<StorageItem>> {
            check_key(key)?;
            match tokio::fs::read(self.meta_path(key)).await {
                Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        async fn get(&self, key: &str) -> Result<Option<(StorageItem, ShardAccess)>> {
            check_key(key)?;
            let Some(item) = self.peek(key).await? else { return Ok(None) };
            let access = if tokio::fs::try_exists(self.shard_path(key)).await? {
                ShardAccess::Readable
            } else {
                ShardAccess::Writable
            };
            Ok(Some((item, access)))
        }

        async fn put(&self, key: &str, item: StorageItem) -> Result<()> {
            check_key(key)?;
            let bytes = serde_json::to_vec(&item)?;
            tokio::fs::write(self.meta_path(key), bytes).await?;
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<()> {
            check_key(key)?;
            let _ = tokio::fs::remove_file(self.meta_path(key)).await;
            let _ = tokio::fs::remove_file(self.shard_path(key)).await;
            Ok(())
        }

        async fn size(&self) -> Result<u64> {
            let meta = dir_size(&self.root.join("meta")).await?;
            let shard = dir_size(&self.root.join("shard")).await?;
            Ok(meta + shard)
        }

        async fn keys(&self) -> Result<Vec<String>> {
            let mut keys = Vec::new();
            let mut entries = tokio::fs::read_dir(self.root.join("meta")).await?;
            while let Some(entry) = entries.next_entry().await? {
                if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    keys.push(name.to_string());
                }
            }
            Ok(keys)
        }

        async fn read_shard(&self, key: &str) -> Result<Vec<u8>> {
            check_key(key)?;
            match tokio::fs::read(self.shard_path(key)).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(key.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        }

        async fn write_shard(&self, key: &str, bytes: &[u8]) -> Result<()> {
            check_key(key)?;
            if tokio::fs::try_exists(self.shard_path(key)).await? {
                return Err(StorageError::ShardAlreadyWritten(key.to_string()));
            }
            tokio::fs::write(self.shard_path(key), bytes).await?;
            Ok(())
        }
    }

}
