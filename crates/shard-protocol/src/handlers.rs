//! the six overlay-bound handlers: offer, consign, mirror, retrieve, audit,
//! renew. Each wraps the lower storage/transfer/identity crates the way
//! `ZidecarService` wraps `ZebradClient`/`Storage`/`EpochManager` -- plain
//! dependency injection, no hidden global state.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use tracing::info;

use shard_audit::Proof;
use shard_contract::{Actor, Contract, Field};
use shard_identity::NodeKeyPair;
use shard_storage::{StorageAdapter, StorageItem};
use shard_transfer::{ShardServer, TransferClient};

use crate::error::{ProtocolError, Result};
use crate::overlay::{MirrorReport, MirrorRequest, Overlay, RetrieveRequest};

/// default epsilon window (`CONSIGN_THRESHOLD`) around a contract's
/// `store_begin` within which a CONSIGN is accepted.
pub const DEFAULT_CONSIGN_THRESHOLD_MS: u64 = 30_000;

fn is_valid_hash(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Ripemd160::digest(Sha256::digest(data)))
}

pub struct ProtocolHandler<A: StorageAdapter, O: Overlay> {
    server: Arc<ShardServer<A>>,
    overlay: O,
    keypair: NodeKeyPair,
    blacklist: Mutex<HashSet<String>>,
    consign_threshold_ms: u64,
}

impl<A: StorageAdapter + 'static, O: Overlay> ProtocolHandler<A, O> {
    pub fn new(server: Arc<ShardServer<A>>, overlay: O, keypair: NodeKeyPair) -> Self {
        Self::with_consign_threshold(server, overlay, keypair, DEFAULT_CONSIGN_THRESHOLD_MS)
    }

    pub fn with_consign_threshold(
        server: Arc<ShardServer<A>>,
        overlay: O,
        keypair: NodeKeyPair,
        consign_threshold_ms: u64,
    ) -> Self {
        Self {
            server,
            overlay,
            keypair,
            blacklist: Mutex::new(HashSet::new()),
            consign_threshold_ms,
        }
    }

    pub fn blacklist(&self, renter_id: impl Into<String>) {
        self.blacklist.lock().unwrap().insert(renter_id.into());
    }

    fn is_blacklisted(&self, renter_id: &str) -> bool {
        self.blacklist.lock().unwrap().contains(renter_id)
    }

    /// OFFER: the renter has already signed, naming us as the intended
    /// farmer; we decide whether to counter-sign and bind ourselves to it.
    /// Nothing is persisted here -- persistence happens at CONSIGN.
    pub fn handle_offer(&self, mut contract: Contract) -> Result<Contract> {
        if !contract.verify(Actor::Renter).unwrap_or(false) {
            return Err(ProtocolError::Validation("renter signature does not verify".into()));
        }

        let renter_id = contract
            .get(Field::RenterId)
            .as_str()
            .ok_or_else(|| ProtocolError::Validation("offer is missing renter_id".into()))?
            .to_string();
        let our_fingerprint = hex::encode(self.keypair.fingerprint());
        let targeted_at_us = contract.get(Field::FarmerId).as_str() == Some(our_fingerprint.as_str());

        if !targeted_at_us || self.is_blacklisted(&renter_id) || self.server.manager.is_locked() {
            return Err(ProtocolError::Auth("Contract no longer open to offers".into()));
        }

        contract.sign(Actor::Farmer, &self.keypair)?;
        Ok(contract)
    }

    /// CONSIGN: load-or-create the item, bind the contract and its public
    /// audit record to `contact`, and issue a one-shot upload token.
    pub async fn handle_consign(
        &self,
        contact: &str,
        contract: Contract,
        audit_leaves: Vec<String>,
        now_ms: u64,
    ) -> Result<String> {
        if contract.get(Field::RenterId).as_str() != Some(contact) {
            return Err(ProtocolError::Auth(
                "requesting identity is not a renter on this item".into(),
            ));
        }

        let store_begin = contract
            .get(Field::StoreBegin)
            .as_u64()
            .ok_or_else(|| ProtocolError::Validation("contract is missing store_begin".into()))?;
        let lower = store_begin.saturating_sub(self.consign_threshold_ms);
        let upper = store_begin.saturating_add(self.consign_threshold_ms);
        if now_ms < lower || now_ms > upper {
            return Err(ProtocolError::Validation(
                "consignment is outside the allowed store_begin window".into(),
            ));
        }

        let hash = contract
            .get(Field::DataHash)
            .as_str()
            .ok_or_else(|| ProtocolError::Validation("contract is missing data_hash".into()))?
            .to_string();

        let mut item = StorageItem::new(hash.clone(), now_ms);
        item.contracts.insert(contact.to_string(), contract);
        item.trees.insert(contact.to_string(), audit_leaves);
        self.server.manager.save(item).await?;

        let token = self.server.tokens.accept(&hash, contact, now_ms);
        info!(hash, contact, "shard consigned");
        Ok(token)
    }

    /// RETRIEVE: `contact` must already hold a contract on the item.
    pub async fn handle_retrieve(&self, contact: &str, hash: &str, now_ms: u64) -> Result<String> {
        let item = self
            .server
            .manager
            .peek(hash)
            .await?
            .ok_or_else(|| ProtocolError::NotFound("no item for this hash".into()))?;

        if item.get_contract(contact).is_none() {
            return Err(ProtocolError::Auth("Retrieval is not authorized".into()));
        }

        Ok(self.server.tokens.accept(hash, contact, now_ms))
    }

    /// AUDIT: malformed hash keys fail the whole call; a challenge that
    /// can't be proven (unknown item, missing leaves, tampered shard) is
    /// simply absent from the response, never a call failure.
    pub async fn handle_audit(
        &self,
        contact: &str,
        challenges: BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, Vec<(String, Proof)>>> {
        for hash in challenges.keys() {
            if !is_valid_hash(hash) {
                return Err(ProtocolError::Validation(format!("not a valid shard hash: {hash}")));
            }
        }

        let mut proofs = BTreeMap::new();
        for (hash, wanted) in challenges {
            let Some(item) = self.server.manager.peek(&hash).await? else { continue };
            let Some(leaves_hex) = item.trees.get(contact) else { continue };
            let Ok(leaves) = leaves_hex
                .iter()
                .map(|h| hex::decode(h).map(|b| b.try_into().unwrap_or([0u8; 20])))
                .collect::<std::result::Result<Vec<[u8; 20]>, _>>()
            else {
                continue;
            };
            let Ok(shard) = self.server.manager.adapter().read_shard(&hash).await else { continue };

            let mut proven = Vec::new();
            for challenge in wanted {
                if let Ok(proof) = shard_audit::proof_stream(&leaves, &challenge, &shard) {
                    proven.push((challenge, proof));
                }
            }
            if !proven.is_empty() {
                proofs.insert(hash, proven);
            }
        }
        Ok(proofs)
    }

    /// RENEW: both signatures must still verify and only the
    /// renewal-permitted fields may differ.
    pub async fn handle_renew(&self, contact: &str, updated: Contract, now_ms: u64) -> Result<Contract> {
        let hash = updated
            .get(Field::DataHash)
            .as_str()
            .ok_or_else(|| ProtocolError::Validation("contract is missing data_hash".into()))?
            .to_string();

        let item = self
            .server
            .manager
            .peek(&hash)
            .await?
            .ok_or_else(|| ProtocolError::NotFound("no item for this hash".into()))?;
        let original = item
            .get_contract(contact)
            .ok_or_else(|| ProtocolError::NotFound("no contract exists for that renter identity".into()))?
            .clone();

        if !original.verify(Actor::Renter).unwrap_or(false) {
            return Err(ProtocolError::Auth("original renter signature does not verify".into()));
        }
        if !updated.verify(Actor::Renter).unwrap_or(false) {
            return Err(ProtocolError::Auth("updated renter signature does not verify".into()));
        }

        // a renewal may only touch its own signature and extend
        // `store_end`; everything else -- including `payment_destination`,
        // unlike `Contract::compare`'s generic notion of a "same deal" --
        // must round-trip unchanged or the renewal is rejected.
        const RENEWAL_MAY_CHANGE: [Field; 3] = [Field::RenterSignature, Field::FarmerSignature, Field::StoreEnd];
        let diffs: Vec<Field> = Contract::diff(&original, &updated)
            .into_iter()
            .filter(|f| !RENEWAL_MAY_CHANGE.contains(f))
            .collect();
        if let Some(field) = diffs.first() {
            return Err(ProtocolError::Validation(format!("{} cannot be changed", field.name())));
        }

        let mut countersigned = updated;
        countersigned.sign(Actor::Farmer, &self.keypair)?;

        let mut item = StorageItem::new(hash.clone(), now_ms);
        item.contracts.insert(contact.to_string(), countersigned.clone());
        self.server.manager.save(item).await?;

        info!(hash, contact, "contract renewed");
        Ok(countersigned)
    }

    /// MIRROR: fetch a shard we don't have yet from farmer A, verify it,
    /// and store it locally.
    pub async fn handle_mirror(&self, req: MirrorRequest) -> Result<MirrorReport> {
        if let Some((_, shard_storage::ShardAccess::Readable)) =
            self.server.manager.adapter().get(&req.hash).await?
        {
            return Ok(MirrorReport { hash: req.hash, bytes_transferred: 0 });
        }

        let retrieve = self
            .overlay
            .retrieve(
                &req.source_peer,
                RetrieveRequest { contact: req.contact.clone(), hash: req.hash.clone() },
            )
            .await?;

        let client = TransferClient::new(&req.source_base_url);
        let pull = client.pull(&retrieve.token, &req.hash).await?;
        let bytes = pull.bytes()?.to_vec();

        if hash_bytes(&bytes) != req.hash {
            pull.destroy();
            return Err(ProtocolError::Integrity("mirrored shard does not match its hash".into()));
        }

        self.server.manager.adapter().write_shard(&req.hash, &bytes).await?;
        pull.destroy();
        info!(hash = req.hash, from = req.source_peer, "shard mirrored");

        Ok(MirrorReport { hash: req.hash, bytes_transferred: bytes.len() as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use shard_storage::{MemoryAdapter, StorageManager};
    use shard_transfer::TokenTable;

    use crate::overlay::{
        AuditRequest, AuditResponse, ConsignRequest, ConsignResponse, OfferRequest, OfferResponse,
        RenewRequest, RenewResponse, RetrieveResponse,
    };

    struct NullOverlay;

    #[async_trait]
    impl Overlay for NullOverlay {
        async fn offer(&self, _peer: &str, _req: OfferRequest) -> Result<OfferResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn consign(&self, _peer: &str, _req: ConsignRequest) -> Result<ConsignResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn mirror(&self, _peer: &str, _req: MirrorRequest) -> Result<MirrorReport> {
            unimplemented!("not exercised by these tests")
        }
        async fn retrieve(&self, _peer: &str, _req: RetrieveRequest) -> Result<RetrieveResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn audit(&self, _peer: &str, _req: AuditRequest) -> Result<AuditResponse> {
            unimplemented!("not exercised by these tests")
        }
        async fn renew(&self, _peer: &str, _req: RenewRequest) -> Result<RenewResponse> {
            unimplemented!("not exercised by these tests")
        }
    }

    // `NodeKeyPair` has no `Clone`, so each test constructs the farmer's
    // identity from the same raw 32-byte seed once for `offer_contract` and
    // once more for the handler, rather than sharing one instance.
    fn offer_contract(renter: &NodeKeyPair, farmer: &NodeKeyPair, data: &[u8], store_begin: u64, store_end: u64) -> Contract {
        let hash = hash_bytes(data);
        let mut c = Contract::new();
        c.update(&[
            (Field::DataHash, Value::String(hash)),
            (Field::DataSize, Value::from(data.len() as u64)),
            (Field::RenterId, Value::String(hex::encode(renter.fingerprint()))),
            (Field::FarmerId, Value::String(hex::encode(farmer.fingerprint()))),
            (Field::StoreBegin, Value::from(store_begin)),
            (Field::StoreEnd, Value::from(store_end)),
            (Field::AuditCount, Value::from(3u64)),
            (Field::PaymentDestination, Value::String("1BoatSLRHtKNngkdXEeobR76b53LETtpyT".into())),
            (Field::PaymentStoragePrice, Value::from(1u64)),
            (Field::PaymentDownloadPrice, Value::from(1u64)),
        ])
        .unwrap();
        c.sign(Actor::Renter, renter).unwrap();
        c
    }

    #[tokio::test]
    async fn offer_then_consign_then_retrieve_round_trip() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let farmer = NodeKeyPair::from_bytes(&farmer_bytes).unwrap();

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::new(server.clone(), NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());

        let data = b"some shard bytes";
        let contract = offer_contract(&renter, &farmer, data, 1_000, 1_000 + 86_400_000);

        let signed = handler.handle_offer(contract).unwrap();
        assert!(signed.verify(Actor::Farmer).unwrap());

        let renter_id = hex::encode(renter.fingerprint());
        let leaves = vec!["a".repeat(40)];
        let token = handler
            .handle_consign(&renter_id, signed, leaves, 1_000)
            .await
            .unwrap();
        assert!(!token.is_empty());

        let hash = hash_bytes(data);
        let retrieve_token = handler.handle_retrieve(&renter_id, &hash, 1_000).await.unwrap();
        assert!(!retrieve_token.is_empty());
    }

    #[tokio::test]
    async fn offer_rejected_when_blacklisted() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let farmer = NodeKeyPair::from_bytes(&farmer_bytes).unwrap();

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::new(server, NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());
        handler.blacklist(hex::encode(renter.fingerprint()));

        let contract = offer_contract(&renter, &farmer, b"bytes", 1_000, 2_000_000);
        let err = handler.handle_offer(contract).unwrap_err();
        assert_eq!(err.to_string(), "Contract no longer open to offers");
    }

    #[tokio::test]
    async fn retrieve_without_contract_is_unauthorized() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::new(server.clone(), NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());

        let hash = hash_bytes(b"unseen data");
        let mut item = StorageItem::new(hash.clone(), 0);
        item.contracts.insert("someone-else".into(), Contract::new());
        server.manager.adapter().put(&hash, item).await.unwrap();

        let err = handler
            .handle_retrieve(&hex::encode(renter.fingerprint()), &hash, 0)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Retrieval is not authorized");
    }

    #[tokio::test]
    async fn consign_outside_threshold_window_is_rejected() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let farmer = NodeKeyPair::from_bytes(&farmer_bytes).unwrap();

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::with_consign_threshold(
            server,
            NullOverlay,
            NodeKeyPair::from_bytes(&farmer_bytes).unwrap(),
            1_000,
        );

        let data = b"bytes";
        let contract = offer_contract(&renter, &farmer, data, 1_000_000, 2_000_000);
        let signed = handler.handle_offer(contract).unwrap();

        let renter_id = hex::encode(renter.fingerprint());
        let err = handler
            .handle_consign(&renter_id, signed, vec![], 50_000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "consignment is outside the allowed store_begin window");
    }

    #[tokio::test]
    async fn renew_extends_window_then_rejects_changed_payment_destination() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let farmer = NodeKeyPair::from_bytes(&farmer_bytes).unwrap();

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::new(server.clone(), NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());

        let data = b"renewable shard";
        let contract = offer_contract(&renter, &farmer, data, 1_000, 1_000 + 86_400_000);
        let signed = handler.handle_offer(contract).unwrap();
        let renter_id = hex::encode(renter.fingerprint());
        handler.handle_consign(&renter_id, signed.clone(), vec![], 1_000).await.unwrap();

        let mut renewed = signed.clone();
        renewed
            .update(&[(Field::StoreEnd, Value::from(signed.get(Field::StoreEnd).as_u64().unwrap() + 30 * 86_400_000))])
            .unwrap();
        renewed.sign(Actor::Renter, &renter).unwrap();

        let accepted = handler.handle_renew(&renter_id, renewed, 2_000).await.unwrap();
        assert!(accepted.verify(Actor::Farmer).unwrap());

        let mut changed = accepted.clone();
        changed
            .update(&[(Field::PaymentDestination, Value::String("1111111111111111111114oLvT2".into()))])
            .unwrap();
        changed.sign(Actor::Renter, &renter).unwrap();

        let err = handler.handle_renew(&renter_id, changed, 3_000).await.unwrap_err();
        assert_eq!(err.to_string(), "payment_destination cannot be changed");
    }

    #[tokio::test]
    async fn audit_proves_untampered_shard_and_fails_after_tamper() {
        let mut rng = rand::thread_rng();
        let renter = NodeKeyPair::generate(&mut rng);
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let farmer = NodeKeyPair::from_bytes(&farmer_bytes).unwrap();

        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let handler = ProtocolHandler::new(server.clone(), NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());

        let data = b"audited shard bytes";
        let (private, public) = shard_audit::audit_stream(3, data);
        let leaves_hex: Vec<String> = public.leaves.iter().map(hex::encode).collect();

        let contract = offer_contract(&renter, &farmer, data, 1_000, 1_000 + 86_400_000);
        let signed = handler.handle_offer(contract).unwrap();
        let renter_id = hex::encode(renter.fingerprint());
        handler
            .handle_consign(&renter_id, signed, leaves_hex, 1_000)
            .await
            .unwrap();

        let hash = hash_bytes(data);
        server.manager.adapter().write_shard(&hash, data).await.unwrap();

        let mut requested = BTreeMap::new();
        requested.insert(hash.clone(), private.challenges.clone());
        let proofs = handler.handle_audit(&renter_id, requested.clone()).await.unwrap();
        let proven = proofs.get(&hash).unwrap();
        assert_eq!(proven.len(), private.challenges.len());
        for (_, proof) in proven {
            let outcome = shard_audit::verify(proof, private.root, private.depth);
            assert!(outcome.valid);
        }

        // tamper: delete and rewrite under a distinct key to simulate corruption
        // (the adapter is write-once, so we verify proof_stream directly fails)
        let mut tampered = data.to_vec();
        tampered[0] ^= 0xFF;
        assert!(shard_audit::proof_stream(&public.leaves, &private.challenges[0], &tampered).is_err());
    }

    #[tokio::test]
    async fn mirror_is_a_no_op_when_shard_already_local() {
        let manager = Arc::new(StorageManager::new(MemoryAdapter::new(), 1_000_000_000));
        let server = ShardServer::new(manager, Arc::new(TokenTable::new(60_000)));
        let mut rng = rand::thread_rng();
        let farmer_bytes: [u8; 32] = rand::Rng::gen(&mut rng);
        let handler = ProtocolHandler::new(server.clone(), NullOverlay, NodeKeyPair::from_bytes(&farmer_bytes).unwrap());

        let data = b"already have this";
        let hash = hash_bytes(data);
        let mut item = StorageItem::new(hash.clone(), 0);
        item.contracts.insert("farmer-local".into(), Contract::new());
        server.manager.adapter().put(&hash, item).await.unwrap();
        server.manager.adapter().write_shard(&hash, data).await.unwrap();

        let report = handler
            .handle_mirror(MirrorRequest {
                hash: hash.clone(),
                contact: "renter-1".into(),
                source_peer: "peer-a".into(),
                source_base_url: "http://unused".into(),
            })
            .await
            .unwrap();
        assert_eq!(report.bytes_transferred, 0);
    }
}
