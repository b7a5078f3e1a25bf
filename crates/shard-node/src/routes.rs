//! JSON-over-HTTP bindings for the six overlay RPCs, one route per
//! `ProtocolHandler` method, the way `shard-transfer::server` exposes
//! upload/download as plain axum routes over its own state.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use shard_protocol::{
    AuditRequest, AuditResponse, ConsignRequest, ConsignResponse, MirrorReport, MirrorRequest,
    OfferRequest, OfferResponse, Overlay, ProtocolError, ProtocolHandler, RenewRequest,
    RenewResponse, RetrieveRequest, RetrieveResponse, ShardErrorEnvelope,
};
use shard_storage::StorageAdapter;

fn status_for(e: &ProtocolError) -> StatusCode {
    match e {
        ProtocolError::Validation(_) => StatusCode::BAD_REQUEST,
        ProtocolError::Auth(_) => StatusCode::UNAUTHORIZED,
        ProtocolError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProtocolError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProtocolError::NotFound(_) => StatusCode::NOT_FOUND,
        ProtocolError::Capacity(_) => StatusCode::INSUFFICIENT_STORAGE,
        ProtocolError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

fn into_response(e: ProtocolError) -> (StatusCode, Json<ShardErrorEnvelope>) {
    let status = status_for(&e);
    (status, Json(e.into()))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

pub fn router<A, O>(handler: Arc<ProtocolHandler<A, O>>) -> Router
where
    A: StorageAdapter + 'static,
    O: Overlay + 'static,
{
    Router::new()
        .route("/overlay/offer", post(offer::<A, O>))
        .route("/overlay/consign", post(consign::<A, O>))
        .route("/overlay/retrieve", post(retrieve::<A, O>))
        .route("/overlay/audit", post(audit::<A, O>))
        .route("/overlay/renew", post(renew::<A, O>))
        .route("/overlay/mirror", post(mirror::<A, O>))
        .with_state(handler)
}

type St<A, O> = State<Arc<ProtocolHandler<A, O>>>;

async fn offer<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<OfferRequest>,
) -> Result<Json<OfferResponse>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler
        .handle_offer(req.contract)
        .map(|contract| Json(OfferResponse { contract }))
        .map_err(into_response)
}

async fn consign<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<ConsignRequest>,
) -> Result<Json<ConsignResponse>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler
        .handle_consign(&req.contact, req.contract, req.audit_leaves, now_ms())
        .await
        .map(|token| Json(ConsignResponse { token }))
        .map_err(into_response)
}

async fn retrieve<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler
        .handle_retrieve(&req.contact, &req.hash, now_ms())
        .await
        .map(|token| Json(RetrieveResponse { token }))
        .map_err(into_response)
}

async fn audit<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<AuditRequest>,
) -> Result<Json<AuditResponse>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler
        .handle_audit(&req.contact, req.challenges)
        .await
        .map(|proofs| Json(AuditResponse { proofs }))
        .map_err(into_response)
}

async fn renew<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<RenewRequest>,
) -> Result<Json<RenewResponse>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler
        .handle_renew(&req.contact, req.updated, now_ms())
        .await
        .map(|contract| Json(RenewResponse { contract }))
        .map_err(into_response)
}

async fn mirror<A: StorageAdapter + 'static, O: Overlay + 'static>(
    State(handler): St<A, O>,
    Json(req): Json<MirrorRequest>,
) -> Result<Json<MirrorReport>, (StatusCode, Json<ShardErrorEnvelope>)> {
    handler.handle_mirror(req).await.map(Json).map_err(into_response)
}
