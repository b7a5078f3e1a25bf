//! token-gated shard server and shard-transfer client.

pub mod client;
pub mod error;
pub mod server;
pub mod tokens;
pub mod wire;

pub use client::{PullStream, TransferClient, TIME_TO_FIRST_BYTE, TIME_TO_WRITE_ACK};
pub use error::{Result, TransferError};
pub use server::ShardServer;
pub use tokens::{TokenTable, DEFAULT_TOKEN_TTL_MS};
