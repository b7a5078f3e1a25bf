//! shard-transfer client: a push (writable) and a pull (readable) bytestream
//! over the `/transfer` WebSocket, each with its own deadline, grounded on
//! the `tokio-tungstenite` client pattern `ibp-probe-host` uses elsewhere in
//! this workspace for talking to a WebSocket peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

use crate::error::{Result, TransferError};
use crate::wire::{self, Handshake};

pub const TIME_TO_FIRST_BYTE: Duration = Duration::from_secs(30);
pub const TIME_TO_WRITE_ACK: Duration = Duration::from_secs(5);

fn close_frame_error(frame: Option<CloseFrame<'static>>) -> TransferError {
    let Some(frame) = frame else {
        return TransferError::StreamClosedAbnormally("connection closed without a reason".into());
    };
    match u16::from(frame.code) {
        wire::UNAUTHORIZED_TOKEN => TransferError::UnknownToken,
        wire::FAILED_INTEGRITY => TransferError::ShardHashMismatch,
        _ => TransferError::StreamClosedAbnormally(frame.reason.to_string()),
    }
}

/// talks to a peer's `/transfer` socket to push or pull shard bytes under a
/// token.
pub struct TransferClient {
    ws_url: String,
}

impl TransferClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let ws_url = base_url
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| base_url.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
            .unwrap_or(base_url);
        Self { ws_url: format!("{ws_url}/transfer") }
    }

    /// pull a shard: authenticate once, then wait up to [`TIME_TO_FIRST_BYTE`]
    /// for the payload frame to arrive.
    pub async fn pull(&self, token: &str, hash: &str) -> Result<PullStream> {
        let (mut socket, _) = tokio_tungstenite::connect_async(&self.ws_url)
            .await
            .map_err(|e| TransferError::StreamClosedAbnormally(e.to_string()))?;

        let handshake = Handshake::new(token, hash, wire::PULL);
        socket
            .send(WsMessage::Text(serde_json::to_string(&handshake).expect("handshake serializes")))
            .await
            .map_err(|e| TransferError::StreamClosedAbnormally(e.to_string()))?;

        let first = tokio::time::timeout(TIME_TO_FIRST_BYTE, socket.next())
            .await
            .map_err(|_| TransferError::TimeToFirstByteExceeded)?;

        let bytes = match first {
            Some(Ok(WsMessage::Binary(bytes))) => bytes,
            Some(Ok(WsMessage::Close(frame))) => return Err(close_frame_error(frame)),
            Some(Ok(_)) => return Err(TransferError::StreamClosedAbnormally("unexpected message before payload".into())),
            Some(Err(e)) => return Err(TransferError::StreamClosedAbnormally(e.to_string())),
            None => return Err(TransferError::StreamClosedAbnormally("connection closed before payload".into())),
        };

        // drain the server's normal-close frame; a non-normal one here still
        // means the payload we already have is suspect.
        if let Some(Ok(WsMessage::Close(Some(frame)))) = socket.next().await {
            if u16::from(frame.code) != wire::NORMAL {
                return Err(close_frame_error(Some(frame)));
            }
        }

        Ok(PullStream { bytes, destroyed: AtomicBool::new(false) })
    }

    /// push a shard: authenticate, send the full body as one binary frame,
    /// then wait up to [`TIME_TO_WRITE_ACK`] after flushing for the server's
    /// normal close.
    pub async fn push(&self, token: &str, hash: &str, bytes: Vec<u8>) -> Result<()> {
        let (mut socket, _) = tokio_tungstenite::connect_async(&self.ws_url)
            .await
            .map_err(|e| TransferError::StreamClosedAbnormally(e.to_string()))?;

        let handshake = Handshake::new(token, hash, wire::PUSH);
        socket
            .send(WsMessage::Text(serde_json::to_string(&handshake).expect("handshake serializes")))
            .await
            .map_err(|e| TransferError::StreamClosedAbnormally(e.to_string()))?;
        socket
            .send(WsMessage::Binary(bytes))
            .await
            .map_err(|e| TransferError::StreamClosedAbnormally(e.to_string()))?;

        // the writer is flushed; the TTWA clock starts now and clears on the
        // server's normal close.
        let ack = tokio::time::timeout(TIME_TO_WRITE_ACK, socket.next())
            .await
            .map_err(|_| TransferError::TimeToWriteAckExceeded)?;

        match ack {
            Some(Ok(WsMessage::Close(Some(frame)))) if u16::from(frame.code) == wire::NORMAL => Ok(()),
            Some(Ok(WsMessage::Close(frame))) => Err(close_frame_error(frame)),
            Some(Ok(_)) => Err(TransferError::StreamClosedAbnormally("unexpected message during ack wait".into())),
            Some(Err(e)) => Err(TransferError::StreamClosedAbnormally(e.to_string())),
            None => {
                warn!("push socket closed without an acknowledgement");
                Err(TransferError::StreamClosedAbnormally("connection closed without ack".into()))
            }
        }
    }
}

/// a readable bytestream pulled from a peer. `destroy()` is idempotent and
/// prevents any further reads.
pub struct PullStream {
    bytes: Vec<u8>,
    destroyed: AtomicBool,
}

impl PullStream {
    pub fn bytes(&self) -> Result<&[u8]> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransferError::Destroyed);
        }
        Ok(&self.bytes)
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}
