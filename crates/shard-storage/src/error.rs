//! storage adapter/manager errors

use core::fmt;

#[derive(Debug)]
pub enum StorageError {
    /// a key was not exactly 40 lowercase hex characters
    InvalidKey(String),
    NotFound(String),
    /// write-once shard already has bytes on disk
    ShardAlreadyWritten(String),
    CapacityReached,
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey(k) => write!(f, "invalid storage key: {k:?}"),
            Self::NotFound(k) => write!(f, "no item under key {k:?}"),
            Self::ShardAlreadyWritten(k) => write!(f, "shard for key {k:?} is already written"),
            Self::CapacityReached => write!(f, "storage capacity reached"),
            Self::Io(e) => write!(f, "storage io error: {e}"),
            Self::Serialization(e) => write!(f, "storage serialization error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// a storage key must be exactly 40 lowercase hex characters (a RIPEMD160 digest).
pub fn validate_key(key: &str) -> Result<()> {
    let valid = key.len() == 40 && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
