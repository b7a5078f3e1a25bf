//! shard transfer errors: token admission, shard server, and transfer client

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    UnknownToken,
    TokenExpired,
    TokenHashMismatch,
    ContractNotFound,
    ShardAlreadyExists,
    ShardExceedsContractSize,
    ShardHashMismatch,
    TimeToFirstByteExceeded,
    TimeToWriteAckExceeded,
    StreamClosedAbnormally(String),
    Destroyed,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownToken => write!(f, "unknown token"),
            Self::TokenExpired => write!(f, "token has expired"),
            Self::TokenHashMismatch => write!(f, "token does not authorize this hash"),
            Self::ContractNotFound => write!(f, "no contract for this hash and identity"),
            Self::ShardAlreadyExists => write!(f, "shard already exists"),
            Self::ShardExceedsContractSize => write!(f, "shard exceeds size defined in contract"),
            Self::ShardHashMismatch => write!(f, "hash does not match contract"),
            Self::TimeToFirstByteExceeded => {
                write!(f, "did not receive data within max time-to-first-byte")
            }
            Self::TimeToWriteAckExceeded => {
                write!(f, "did not close channel by max time-to-write-acknowledgement")
            }
            Self::StreamClosedAbnormally(msg) => write!(f, "stream closed abnormally: {msg}"),
            Self::Destroyed => write!(f, "stream was destroyed"),
        }
    }
}

impl std::error::Error for TransferError {}

pub type Result<T> = std::result::Result<T, TransferError>;
