//! `Overlay` over plain HTTP: each peer is addressed by its base URL, and
//! every RPC is one JSON POST, the same client shape as `zidecar::zebrad`'s
//! `ZebradClient` wraps a single `reqwest::Client` per outbound call.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shard_protocol::{
    AuditRequest, AuditResponse, ConsignRequest, ConsignResponse, MirrorReport, MirrorRequest,
    OfferRequest, OfferResponse, Overlay, ProtocolError, RenewRequest, RenewResponse,
    RetrieveRequest, RetrieveResponse, ShardErrorEnvelope,
};

#[derive(Clone)]
pub struct HttpOverlay {
    client: Client,
}

impl HttpOverlay {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        peer: &str,
        route: &str,
        req: &Req,
    ) -> shard_protocol::Result<Resp> {
        let url = format!("{}{}", peer.trim_end_matches('/'), route);
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let envelope: ShardErrorEnvelope = response
                .json()
                .await
                .map_err(|e| ProtocolError::Transport(e.to_string()))?;
            return Err(ProtocolError::Transport(envelope.error.message));
        }

        response
            .json()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))
    }
}

impl Default for HttpOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Overlay for HttpOverlay {
    async fn offer(&self, peer: &str, req: OfferRequest) -> shard_protocol::Result<OfferResponse> {
        self.call(peer, "/overlay/offer", &req).await
    }

    async fn consign(
        &self,
        peer: &str,
        req: ConsignRequest,
    ) -> shard_protocol::Result<ConsignResponse> {
        self.call(peer, "/overlay/consign", &req).await
    }

    async fn mirror(&self, peer: &str, req: MirrorRequest) -> shard_protocol::Result<MirrorReport> {
        self.call(peer, "/overlay/mirror", &req).await
    }

    async fn retrieve(
        &self,
        peer: &str,
        req: RetrieveRequest,
    ) -> shard_protocol::Result<RetrieveResponse> {
        self.call(peer, "/overlay/retrieve", &req).await
    }

    async fn audit(&self, peer: &str, req: AuditRequest) -> shard_protocol::Result<AuditResponse> {
        self.call(peer, "/overlay/audit", &req).await
    }

    async fn renew(&self, peer: &str, req: RenewRequest) -> shard_protocol::Result<RenewResponse> {
        self.call(peer, "/overlay/renew", &req).await
    }
}
