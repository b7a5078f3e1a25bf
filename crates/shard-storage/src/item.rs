//! in-memory entity binding a shard hash to one or more contracts, per-farmer
//! Merkle trees, per-farmer audit challenges, and metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shard_contract::{Contract, Field};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StorageItem {
    pub hash: String,
    /// counterparty identity -> contract
    pub contracts: BTreeMap<String, Contract>,
    /// counterparty identity -> published Merkle leaves (public audit record)
    pub trees: BTreeMap<String, Vec<String>>,
    /// counterparty identity -> retained pre-images (private audit record)
    pub challenges: BTreeMap<String, Vec<String>>,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub modified: u64,
    /// counterparty identity -> extended key string, for HD-aware lookup
    pub hd_keys: BTreeMap<String, String>,
}

impl StorageItem {
    pub fn new(hash: impl Into<String>, modified: u64) -> Self {
        Self {
            hash: hash.into(),
            contracts: BTreeMap::new(),
            trees: BTreeMap::new(),
            challenges: BTreeMap::new(),
            meta: BTreeMap::new(),
            modified,
            hd_keys: BTreeMap::new(),
        }
    }

    /// match a contract either by the counterparty's node id or by its
    /// registered HD extended key; absence of both means "not authorized".
    pub fn get_contract(&self, contact: &str) -> Option<&Contract> {
        if let Some(contract) = self.contracts.get(contact) {
            return Some(contract);
        }
        let extended_key = self.hd_keys.get(contact)?;
        self.contracts
            .values()
            .find(|c| c.get(Field::RenterHdKey).as_str() == Some(extended_key.as_str()))
    }

    /// an item is reapable once every contract on it is expired or incomplete.
    pub fn is_reapable(&self, now_ms: u64) -> bool {
        if self.contracts.is_empty() {
            return true;
        }
        self.contracts.values().all(|c| contract_is_stale(c, now_ms))
    }

    /// deep-merge `other` into `self`: per-counterparty maps merge entry by
    /// entry, incoming scalars win.
    pub fn merge(&mut self, other: StorageItem) {
        for (contact, contract) in other.contracts {
            self.contracts.insert(contact, contract);
        }
        for (contact, leaves) in other.trees {
            self.trees.insert(contact, leaves);
        }
        for (contact, challenges) in other.challenges {
            self.challenges.insert(contact, challenges);
        }
        for (key, value) in other.meta {
            self.meta.insert(key, value);
        }
        for (contact, key) in other.hd_keys {
            self.hd_keys.insert(contact, key);
        }
        self.modified = other.modified;
    }
}

fn contract_is_stale(contract: &Contract, now_ms: u64) -> bool {
    let expired = contract
        .get(Field::StoreEnd)
        .as_u64()
        .map(|end| end < now_ms)
        .unwrap_or(false);
    expired || !contract.is_complete()
}
