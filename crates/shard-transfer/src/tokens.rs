//! in-memory upload/download token table: `accept`/`reject` plus a periodic
//! reaper for tokens past their TTL.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::RngCore;

use crate::error::{Result, TransferError};

pub const DEFAULT_TOKEN_TTL_MS: u64 = 30 * 60 * 1000;

#[derive(Clone, Debug)]
struct TokenEntry {
    hash: String,
    contact: String,
    expires_ms: u64,
}

pub struct TokenTable {
    entries: Mutex<HashMap<String, TokenEntry>>,
    ttl_ms: u64,
}

impl TokenTable {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms,
        }
    }

    /// issue a one-shot token authorizing `contact` to transfer `hash` until
    /// `now_ms + ttl`.
    pub fn accept(&self, hash: &str, contact: &str, now_ms: u64) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.entries.lock().unwrap().insert(
            token.clone(),
            TokenEntry {
                hash: hash.to_string(),
                contact: contact.to_string(),
                expires_ms: now_ms + self.ttl_ms,
            },
        );
        token
    }

    pub fn reject(&self, token: &str) {
        self.entries.lock().unwrap().remove(token);
    }

    /// the contact a token was issued to, if it is still valid for `hash`.
    pub fn contact_for(&self, token: &str, hash: &str, now_ms: u64) -> Result<String> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(token).ok_or(TransferError::UnknownToken)?;
        if entry.expires_ms < now_ms {
            return Err(TransferError::TokenExpired);
        }
        if entry.hash != hash {
            return Err(TransferError::TokenHashMismatch);
        }
        Ok(entry.contact.clone())
    }

    pub fn is_authorized(&self, token: &str, hash: &str, now_ms: u64) -> Result<()> {
        self.contact_for(token, hash, now_ms).map(|_| ())
    }

    /// drop every token whose deadline has passed. returns the count reaped.
    pub fn reap(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_ms >= now_ms);
        before - entries.len()
    }
}
