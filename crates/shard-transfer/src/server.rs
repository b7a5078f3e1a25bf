//! token-gated shard server: upload (`POST /shards/{hash}`) and download
//! (`GET /shards/{hash}`) over HTTP, backed by a [`StorageManager`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use ripemd::Ripemd160;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tracing::info;

use shard_contract::{Contract, Field};
use shard_storage::{ShardAccess, StorageAdapter, StorageItem, StorageManager};

use crate::tokens::TokenTable;
use crate::wire::{self, Handshake};

pub struct ShardServer<A: StorageAdapter> {
    pub manager: Arc<StorageManager<A>>,
    pub tokens: Arc<TokenTable>,
    active_transfers: AtomicU64,
}

impl<A: StorageAdapter + 'static> ShardServer<A> {
    pub fn new(manager: Arc<StorageManager<A>>, tokens: Arc<TokenTable>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            tokens,
            active_transfers: AtomicU64::new(0),
        })
    }

    pub fn active_transfers(&self) -> u64 {
        self.active_transfers.load(Ordering::SeqCst)
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/shards/:hash", post(upload::<A>))
            .route("/shards/:hash", get(download::<A>))
            .route("/transfer", get(transfer_ws::<A>))
            .layer(CorsLayer::permissive())
            .with_state(self)
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }
}

#[derive(Deserialize)]
pub struct TokenQuery {
    token: String,
}

async fn load_authorized_item<A: StorageAdapter + 'static>(
    server: &ShardServer<A>,
    token: &str,
    hash: &str,
) -> Result<(String, StorageItem), (StatusCode, String)> {
    let contact = server
        .tokens
        .contact_for(token, hash, ShardServer::<A>::now_ms())
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let item = server
        .manager
        .peek(hash)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "no contract for this hash".to_string()))?;

    if item.get_contract(&contact).is_none() {
        return Err((StatusCode::NOT_FOUND, "no contract for this hash".to_string()));
    }

    Ok((contact, item))
}

async fn upload<A: StorageAdapter + 'static>(
    State(server): State<Arc<ShardServer<A>>>,
    Path(hash): Path<String>,
    Query(query): Query<TokenQuery>,
    body: axum::body::Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let now = ShardServer::<A>::now_ms();
    let (contact, item) = load_authorized_item(&server, &query.token, &hash).await?;

    let contract = item.get_contract(&contact).expect("checked above").clone();

    if let Some((_, ShardAccess::Readable)) = server
        .manager
        .adapter()
        .get(&hash)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    {
        server.tokens.reject(&query.token);
        return Err((StatusCode::NOT_MODIFIED, "already exists".to_string()));
    }

    server.active_transfers.fetch_add(1, Ordering::SeqCst);
    let result = handle_upload_body(&server, &hash, &query.token, &contract, &body).await;
    server.active_transfers.fetch_sub(1, Ordering::SeqCst);

    let _ = now;
    result.map(|()| StatusCode::OK)
}

async fn handle_upload_body<A: StorageAdapter + 'static>(
    server: &ShardServer<A>,
    hash: &str,
    token: &str,
    contract: &shard_contract::Contract,
    body: &[u8],
) -> Result<(), (StatusCode, String)> {
    let expected_size = contract.get(Field::DataSize).as_u64();
    if let Some(expected_size) = expected_size {
        if body.len() as u64 > expected_size {
            server.tokens.reject(token);
            return Err((
                StatusCode::BAD_REQUEST,
                "Shard exceeds size defined in contract".to_string(),
            ));
        }
    }

    let sha = Sha256::digest(body);
    let computed: [u8; 20] = Ripemd160::digest(sha).into();
    let expected_hash = contract.get(Field::DataHash);
    if expected_hash.as_str() != Some(hex::encode(computed).as_str()) {
        server.tokens.reject(token);
        return Err((StatusCode::BAD_REQUEST, "Hash does not match contract".to_string()));
    }

    server
        .manager
        .adapter()
        .write_shard(hash, body)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    server.tokens.reject(token);
    info!(hash, "shard uploaded");
    Ok(())
}

async fn download<A: StorageAdapter + 'static>(
    State(server): State<Arc<ShardServer<A>>>,
    Path(hash): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<axum::body::Bytes, (StatusCode, String)> {
    load_authorized_item(&server, &query.token, &hash).await?;

    let bytes = server
        .manager
        .adapter()
        .read_shard(&hash)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "no such shard".to_string()))?;

    server.tokens.reject(&query.token);
    info!(hash, "shard downloaded");
    Ok(axum::body::Bytes::from(bytes))
}

/// the bidirectional shard-transfer wire format: a single JSON handshake
/// frame authenticating a PUSH or PULL, followed by binary shard frames.
async fn transfer_ws<A: StorageAdapter + 'static>(
    State(server): State<Arc<ShardServer<A>>>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_transfer_socket(socket, server))
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: impl Into<String>) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code, reason: reason.into().into() })))
        .await;
}

async fn handle_transfer_socket<A: StorageAdapter + 'static>(mut socket: WebSocket, server: Arc<ShardServer<A>>) {
    let handshake = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<Handshake>(&text) {
            Ok(h) => h,
            Err(_) => {
                close_with(&mut socket, wire::INVALID_MESSAGE, "malformed handshake").await;
                return;
            }
        },
        _ => {
            close_with(&mut socket, wire::INVALID_MESSAGE, "expected a JSON handshake message").await;
            return;
        }
    };

    if handshake.operation != wire::PUSH && handshake.operation != wire::PULL {
        close_with(&mut socket, wire::INVALID_OPERATION, "operation must be PUSH or PULL").await;
        return;
    }

    let (contact, item) = match load_authorized_item(&server, &handshake.token, &handshake.hash).await {
        Ok(v) => v,
        Err((status, msg)) if status == StatusCode::UNAUTHORIZED => {
            close_with(&mut socket, wire::UNAUTHORIZED_TOKEN, msg).await;
            return;
        }
        Err((_, msg)) => {
            close_with(&mut socket, wire::UNEXPECTED, msg).await;
            return;
        }
    };

    if handshake.operation == wire::PUSH {
        let contract = item.get_contract(&contact).expect("checked by load_authorized_item").clone();
        handle_ws_push(&mut socket, &server, &handshake.hash, &handshake.token, &contract).await;
    } else {
        handle_ws_pull(&mut socket, &server, &handshake.hash, &handshake.token).await;
    }
}

async fn handle_ws_push<A: StorageAdapter + 'static>(
    socket: &mut WebSocket,
    server: &ShardServer<A>,
    hash: &str,
    token: &str,
    contract: &Contract,
) {
    let expected_size = contract.get(Field::DataSize).as_u64();
    let body = match socket.recv().await {
        Some(Ok(Message::Binary(chunk))) => chunk,
        Some(Ok(Message::Close(_))) | None => Vec::new(),
        Some(Ok(_)) => {
            close_with(socket, wire::INVALID_MESSAGE, "expected a binary shard frame").await;
            return;
        }
        Some(Err(_)) => return,
    };

    if let Some(expected_size) = expected_size {
        if body.len() as u64 > expected_size {
            server.tokens.reject(token);
            close_with(socket, wire::FAILED_INTEGRITY, "Shard exceeds size defined in contract").await;
            return;
        }
    }

    let sha = Sha256::digest(&body);
    let computed: [u8; 20] = Ripemd160::digest(sha).into();
    if contract.get(Field::DataHash).as_str() != Some(hex::encode(computed).as_str()) {
        server.tokens.reject(token);
        close_with(socket, wire::FAILED_INTEGRITY, "Hash does not match contract").await;
        return;
    }

    if let Err(e) = server.manager.adapter().write_shard(hash, &body).await {
        server.tokens.reject(token);
        close_with(socket, wire::UNEXPECTED, e.to_string()).await;
        return;
    }

    server.tokens.reject(token);
    info!(hash, "shard uploaded over websocket");
    close_with(socket, wire::NORMAL, "Consignment completed").await;
}

async fn handle_ws_pull<A: StorageAdapter + 'static>(socket: &mut WebSocket, server: &ShardServer<A>, hash: &str, token: &str) {
    match server.manager.adapter().read_shard(hash).await {
        Ok(bytes) => {
            if socket.send(Message::Binary(bytes)).await.is_err() {
                return;
            }
            server.tokens.reject(token);
            info!(hash, "shard downloaded over websocket");
            close_with(socket, wire::NORMAL, "File transfer complete").await;
        }
        Err(_) => {
            close_with(socket, wire::UNEXPECTED, "no such shard").await;
        }
    }
}
