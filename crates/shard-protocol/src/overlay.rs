//! the opaque Kademlia overlay, represented as a capability trait with one
//! method per RPC so handlers are generic over the transport and testable
//! against an in-memory mock instead of a real network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shard_contract::Contract;

use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OfferRequest {
    pub contract: Contract,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OfferResponse {
    pub contract: Contract,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsignRequest {
    pub contact: String,
    pub contract: Contract,
    pub audit_leaves: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsignResponse {
    pub token: String,
}

/// "fetch shard X from farmer A using pointer P": `source_base_url` is P,
/// the address the shard transfer client dials once the retrieve token is in
/// hand.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorRequest {
    pub hash: String,
    pub contact: String,
    pub source_peer: String,
    pub source_base_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorReport {
    pub hash: String,
    pub bytes_transferred: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub contact: String,
    pub hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRequest {
    pub contact: String,
    /// hash -> challenges to prove for that hash
    pub challenges: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    /// hash -> (challenge, proof) pairs that were successfully proven; a
    /// challenge absent here failed without failing the whole call.
    pub proofs: std::collections::BTreeMap<String, Vec<(String, shard_audit::Proof)>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenewRequest {
    pub contact: String,
    pub updated: Contract,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenewResponse {
    pub contract: Contract,
}

/// one method per overlay RPC. a node dials a peer (`peer`, an opaque
/// overlay address) and awaits its handler's response.
#[async_trait]
pub trait Overlay: Send + Sync {
    async fn offer(&self, peer: &str, req: OfferRequest) -> Result<OfferResponse>;
    async fn consign(&self, peer: &str, req: ConsignRequest) -> Result<ConsignResponse>;
    async fn mirror(&self, peer: &str, req: MirrorRequest) -> Result<MirrorReport>;
    async fn retrieve(&self, peer: &str, req: RetrieveRequest) -> Result<RetrieveResponse>;
    async fn audit(&self, peer: &str, req: AuditRequest) -> Result<AuditResponse>;
    async fn renew(&self, peer: &str, req: RenewRequest) -> Result<RenewResponse>;
}
