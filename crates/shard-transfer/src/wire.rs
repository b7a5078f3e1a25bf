//! the handshake message and close-code vocabulary shared by the
//! WebSocket transfer server and client.

use serde::{Deserialize, Serialize};

/// first message sent client->server on a transfer socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub token: String,
    pub hash: String,
    pub operation: String,
}

impl Handshake {
    pub fn new(token: impl Into<String>, hash: impl Into<String>, operation: &str) -> Self {
        Self { token: token.into(), hash: hash.into(), operation: operation.to_string() }
    }
}

pub const PUSH: &str = "PUSH";
pub const PULL: &str = "PULL";

/// normal-close status; paired with "Consignment completed" or "File
/// transfer complete" depending on direction.
pub const NORMAL: u16 = 1000;

/// application close codes for the named error paths below, chosen from
/// the private-use range (4000-4999) the WebSocket protocol reserves for
/// this purpose.
pub const UNAUTHORIZED_TOKEN: u16 = 4001;
pub const INVALID_MESSAGE: u16 = 4002;
pub const INVALID_OPERATION: u16 = 4003;
pub const FAILED_INTEGRITY: u16 = 4004;
pub const UNEXPECTED: u16 = 4999;
