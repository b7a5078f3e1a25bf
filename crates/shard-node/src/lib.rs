//! node wiring: config, HTTP overlay client, and the JSON route bindings
//! that tie `shard-protocol`'s handlers to `shard-transfer`'s axum server.
//! Split out as a library so integration tests can build the same router
//! `main.rs` serves, against an in-memory adapter and overlay.

use std::sync::Arc;

use shard_identity::NodeKeyPair;
use shard_protocol::{Overlay, ProtocolHandler};
use shard_storage::StorageManager;
use shard_transfer::{ShardServer, TokenTable};

pub mod config;
pub mod overlay_client;
pub mod routes;

pub use config::NodeConfig;
pub use overlay_client::HttpOverlay;

/// wire a storage manager, token table, overlay and keypair into the full
/// node router: shard upload/download plus the six overlay RPCs.
pub fn build_router<A, O>(
    manager: Arc<StorageManager<A>>,
    tokens: Arc<TokenTable>,
    overlay: O,
    keypair: NodeKeyPair,
    consign_threshold_ms: u64,
) -> axum::Router
where
    A: shard_storage::StorageAdapter + 'static,
    O: Overlay + 'static,
{
    let server = ShardServer::new(manager, tokens);
    let handler = Arc::new(ProtocolHandler::with_consign_threshold(
        server.clone(),
        overlay,
        keypair,
        consign_threshold_ms,
    ));

    server
        .router()
        .merge(routes::router(handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
