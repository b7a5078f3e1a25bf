//! wraps a [`StorageAdapter`] with merge-on-save semantics, capacity
//! accounting, and periodic reaping of expired/incomplete items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::{read_all, StorageAdapter};
use crate::error::{Result, StorageError};
use crate::item::StorageItem;

pub struct StorageManager<A: StorageAdapter> {
    adapter: A,
    max_capacity: u64,
    locked: AtomicBool,
}

impl<A: StorageAdapter> StorageManager<A> {
    pub fn new(adapter: A, max_capacity: u64) -> Self {
        Self {
            adapter,
            max_capacity,
            locked: AtomicBool::new(false),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub async fn peek(&self, key: &str) -> Result<Option<StorageItem>> {
        self.adapter.peek(key).await
    }

    /// merge-on-save: fetch the existing item, deep-merge the incoming one
    /// over it (per-counterparty maps merge, incoming scalars win), persist,
    /// then re-check capacity.
    pub async fn save(&self, item: StorageItem) -> Result<()> {
        if self.is_locked() {
            return Err(StorageError::CapacityReached);
        }

        let key = item.hash.clone();
        let mut merged = self.adapter.peek(&key).await?.unwrap_or_else(|| StorageItem::new(key.clone(), item.modified));
        merged.merge(item);
        self.adapter.put(&key, merged).await?;
        self.check_capacity().await?;
        Ok(())
    }

    /// `size()` crossing `max_capacity` toggles the lock that gates future
    /// saves; it never gates `load`/`peek`.
    pub async fn check_capacity(&self) -> Result<bool> {
        let used = self.adapter.size().await?;
        let now_over = used >= self.max_capacity;
        let was_locked = self.locked.swap(now_over, Ordering::SeqCst);

        if now_over && !was_locked {
            warn!(used, max_capacity = self.max_capacity, "storage capacity reached");
        } else if !now_over && was_locked {
            info!(used, max_capacity = self.max_capacity, "storage capacity freed");
        }
        Ok(now_over)
    }

    /// stream every item; delete it if every contract on it is expired or
    /// incomplete. safe to re-enter: each call reads its own snapshot of keys.
    pub async fn clean(&self, now_ms: u64) -> Result<usize> {
        let items = read_all(&self.adapter).await?;
        let mut reaped = 0;
        for item in items {
            if item.is_reapable(now_ms) {
                debug!(hash = %item.hash, "reaping expired storage item");
                self.adapter.del(&item.hash).await?;
                reaped += 1;
            }
        }
        self.check_capacity().await?;
        Ok(reaped)
    }
}

impl<A: StorageAdapter> StorageManager<A> {
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use shard_contract::{Contract, Field};
    use serde_json::Value;

    fn key() -> String {
        "a".repeat(40)
    }

    fn item_with_contract(contact: &str, store_end: u64) -> StorageItem {
        let mut item = StorageItem::new(key(), 1);
        let mut c = Contract::new();
        c.update(&[
            (Field::DataHash, Value::String(key())),
            (Field::DataSize, Value::from(1u64)),
            (Field::RenterId, Value::String("b".repeat(40))),
            (Field::FarmerId, Value::String("c".repeat(40))),
            (Field::StoreBegin, Value::from(0u64)),
            (Field::StoreEnd, Value::from(store_end)),
            (Field::AuditCount, Value::from(1u64)),
            (Field::PaymentDestination, Value::String("1BoatSLRHtKNngkdXEeobR76b53LETtpyT".into())),
            (Field::PaymentStoragePrice, Value::from(1u64)),
            (Field::PaymentDownloadPrice, Value::from(1u64)),
            (Field::RenterSignature, Value::String("sig".into())),
            (Field::FarmerSignature, Value::String("sig".into())),
        ])
        .unwrap();
        item.contracts.insert(contact.to_string(), c);
        item
    }

    #[tokio::test]
    async fn save_merges_per_counterparty_contracts() {
        let manager = StorageManager::new(MemoryAdapter::new(), 1_000_000);
        manager.save(item_with_contract("farmer-a", 5_000)).await.unwrap();
        manager.save(item_with_contract("farmer-b", 6_000)).await.unwrap();

        let merged = manager.peek(&key()).await.unwrap().unwrap();
        assert_eq!(merged.contracts.len(), 2);
    }

    #[tokio::test]
    async fn save_fails_immediately_once_locked() {
        let manager = StorageManager::new(MemoryAdapter::new(), 0);
        // the first save succeeds (capacity is only checked *after* it writes)
        // but trips the lock since size() is already >= the zero-byte ceiling.
        manager.save(item_with_contract("x", 1)).await.unwrap();
        assert!(manager.is_locked());

        // a second save is now rejected before any I/O.
        let err = manager.save(item_with_contract("y", 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::CapacityReached));
    }

    #[tokio::test]
    async fn clean_reaps_items_whose_contracts_are_all_stale() {
        let manager = StorageManager::new(MemoryAdapter::new(), 1_000_000);
        manager.save(item_with_contract("farmer-a", 100)).await.unwrap();

        let reaped = manager.clean(10_000).await.unwrap();
        assert_eq!(reaped, 1);
        assert!(manager.peek(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_keeps_items_with_a_live_contract() {
        let manager = StorageManager::new(MemoryAdapter::new(), 1_000_000);
        manager.save(item_with_contract("farmer-a", 999_999_999)).await.unwrap();

        let reaped = manager.clean(10_000).await.unwrap();
        assert_eq!(reaped, 0);
        assert!(manager.peek(&key()).await.unwrap().is_some());
    }
}
