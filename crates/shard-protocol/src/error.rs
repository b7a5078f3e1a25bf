//! the protocol-level error kinds, each wrapping the lower-layer error that
//! produced it, plus the `{ error: { message } }` RPC response envelope.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Integrity(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Capacity(String),
    #[error("{0}")]
    Transport(String),
}

impl From<shard_contract::ContractError> for ProtocolError {
    fn from(e: shard_contract::ContractError) -> Self {
        ProtocolError::Validation(e.to_string())
    }
}

impl From<shard_audit::AuditError> for ProtocolError {
    fn from(e: shard_audit::AuditError) -> Self {
        ProtocolError::Validation(e.to_string())
    }
}

impl From<shard_storage::StorageError> for ProtocolError {
    fn from(e: shard_storage::StorageError) -> Self {
        match e {
            shard_storage::StorageError::CapacityReached => {
                ProtocolError::Capacity(e.to_string())
            }
            shard_storage::StorageError::NotFound(_) => ProtocolError::NotFound(e.to_string()),
            _ => ProtocolError::Validation(e.to_string()),
        }
    }
}

impl From<shard_transfer::TransferError> for ProtocolError {
    fn from(e: shard_transfer::TransferError) -> Self {
        use shard_transfer::TransferError::*;
        match e {
            TimeToFirstByteExceeded | TimeToWriteAckExceeded => ProtocolError::Timeout(e.to_string()),
            UnknownToken | TokenExpired | TokenHashMismatch => ProtocolError::Auth(e.to_string()),
            ShardHashMismatch => ProtocolError::Integrity(e.to_string()),
            StreamClosedAbnormally(_) => ProtocolError::Transport(e.to_string()),
            _ => ProtocolError::Validation(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// the RPC-layer response envelope every handler error is mapped to.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShardErrorEnvelope {
    pub error: ShardErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardErrorBody {
    pub message: String,
}

impl From<ProtocolError> for ShardErrorEnvelope {
    fn from(e: ProtocolError) -> Self {
        ShardErrorEnvelope {
            error: ShardErrorBody { message: e.to_string() },
        }
    }
}
