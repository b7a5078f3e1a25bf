//! AuditStream / ProofStream / Verifier: the challenge-response
//! proof-of-possession pipeline.
//!
//! All three operations consume the shard byte stream once; restarting
//! means re-reading the shard from the start.

use crate::error::{AuditError, Result};
use crate::merkle::{hash_pair, next_power_of_two, pad_leaves, ripemd160_sha256, Hash, MerkleTree};
use rand::RngCore;
use serde::{Deserialize, Serialize};

fn preimage_hash(challenge: &[u8], shard: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(challenge.len() + shard.len());
    buf.extend_from_slice(challenge);
    buf.extend_from_slice(shard);
    ripemd160_sha256(&buf)
}

fn leaf_hash(challenge: &[u8], shard: &[u8]) -> Hash {
    ripemd160_sha256(&preimage_hash(challenge, shard))
}

/// the renter-retained private audit record: the root, the challenges it may
/// still spend, and the tree depth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPrivate {
    pub root: Hash,
    pub challenges: Vec<String>,
    pub depth: usize,
}

impl AuditPrivate {
    /// remove one challenge after it has been spent on an audit round.
    pub fn strike(&mut self, challenge: &str) -> Result<()> {
        let pos = self
            .challenges
            .iter()
            .position(|c| c == challenge)
            .ok_or(AuditError::InvalidChallenge)?;
        self.challenges.remove(pos);
        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        self.challenges.is_empty()
    }
}

/// the farmer-retained public audit record: only the leaves, never the
/// pre-images, so a farmer cannot forge a proof it hasn't actually computed
/// from the shard bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPublic {
    pub leaves: Vec<Hash>,
}

/// generate `n` random 32-byte hex challenges, the Merkle tree of their
/// leaves over `shard`, and the private/public records each side retains.
pub fn audit_stream(n: usize, shard: &[u8]) -> (AuditPrivate, AuditPublic) {
    let mut rng = rand::thread_rng();
    let challenges: Vec<String> = (0..n)
        .map(|_| {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            hex::encode(bytes)
        })
        .collect();

    let leaves: Vec<Hash> = challenges
        .iter()
        .map(|c| {
            let challenge_bytes = hex::decode(c).expect("just encoded as hex");
            leaf_hash(&challenge_bytes, shard)
        })
        .collect();
    let padded = pad_leaves(leaves);
    let tree = MerkleTree::build(padded.clone());

    (
        AuditPrivate {
            root: tree.root(),
            challenges,
            depth: tree.depth(),
        },
        AuditPublic { leaves: padded },
    )
}

/// a single authentication-path node: either the not-yet-finalized pre-image
/// at the leaf being proven, a sibling hash carried along unresolved, or a
/// branch combining two already-positioned children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofNode {
    Leaf(Hash),
    Sibling(Hash),
    Branch(Box<ProofNode>, Box<ProofNode>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub ProofNode);

fn nesting_depth(node: &ProofNode) -> usize {
    match node {
        ProofNode::Leaf(_) | ProofNode::Sibling(_) => 0,
        ProofNode::Branch(l, r) => 1 + nesting_depth(l).max(nesting_depth(r)),
    }
}

fn collapse(node: &ProofNode) -> Hash {
    match node {
        ProofNode::Leaf(preimage) => ripemd160_sha256(preimage),
        ProofNode::Sibling(h) => *h,
        ProofNode::Branch(l, r) => hash_pair(&collapse(l), &collapse(r)),
    }
}

/// the farmer's response path: locate `challenge`'s leaf among `leaves`,
/// then emit a nested authentication path whose deepest position holds the
/// pre-image rather than the leaf itself.
pub fn proof_stream(leaves: &[Hash], challenge: &str, shard: &[u8]) -> Result<Proof> {
    let challenge_bytes = hex::decode(challenge).map_err(|_| AuditError::MalformedHex)?;
    let preimage = preimage_hash(&challenge_bytes, shard);
    let target = ripemd160_sha256(&preimage);

    let index = leaves
        .iter()
        .position(|l| *l == target)
        .ok_or(AuditError::InvalidChallenge)?;

    let padded_len = next_power_of_two(leaves.len());
    assert_eq!(padded_len, leaves.len(), "published leaves must already be padded");
    let tree = MerkleTree::build(leaves.to_vec());
    let path = tree.authentication_path(index);

    let mut node = ProofNode::Leaf(preimage);
    let mut idx = index;
    for sibling in path {
        node = if idx % 2 == 0 {
            ProofNode::Branch(Box::new(node), Box::new(ProofNode::Sibling(sibling)))
        } else {
            ProofNode::Branch(Box::new(ProofNode::Sibling(sibling)), Box::new(node))
        };
        idx /= 2;
    }

    Ok(Proof(node))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub computed: Hash,
    pub expected: Hash,
    pub valid: bool,
}

/// collapse `proof` and compare against `root`; also requires the proof's
/// nesting depth to equal `depth`.
pub fn verify(proof: &Proof, root: Hash, depth: usize) -> VerifyOutcome {
    let computed = collapse(&proof.0);
    let depth_ok = nesting_depth(&proof.0) == depth;
    VerifyOutcome {
        computed,
        expected: root,
        valid: depth_ok && computed == root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_audit_round_trip() {
        let shard = b"DEADBEEF-shard-bytes".to_vec();
        let (private, public) = audit_stream(3, &shard);

        for challenge in &private.challenges {
            let proof = proof_stream(&public.leaves, challenge, &shard).unwrap();
            let outcome = verify(&proof, private.root, private.depth);
            assert!(outcome.valid);
            assert_eq!(outcome.computed, outcome.expected);
        }
    }

    #[test]
    fn tampered_shard_fails_every_challenge() {
        let shard = b"DEADBEEF-shard-bytes".to_vec();
        let (private, public) = audit_stream(3, &shard);
        let mut tampered = shard.clone();
        tampered[0] ^= 0xFF;

        for challenge in &private.challenges {
            // proof generation itself will fail to find a matching leaf
            // against the tampered bytes for every challenge
            let result = proof_stream(&public.leaves, challenge, &tampered);
            assert!(result.is_err());
        }
    }

    #[test]
    fn unknown_challenge_is_rejected() {
        let shard = b"shard".to_vec();
        let (_private, public) = audit_stream(2, &shard);
        let bogus = hex::encode([0xAAu8; 32]);
        assert_eq!(
            proof_stream(&public.leaves, &bogus, &shard).unwrap_err(),
            AuditError::InvalidChallenge
        );
    }

    #[test]
    fn depth_mismatch_is_rejected() {
        let shard = b"shard-bytes-for-depth-test".to_vec();
        let (private, public) = audit_stream(5, &shard);
        let challenge = &private.challenges[0];
        let proof = proof_stream(&public.leaves, challenge, &shard).unwrap();
        let outcome = verify(&proof, private.root, private.depth + 1);
        assert!(!outcome.valid);
    }

    #[test]
    fn strike_exhausts_challenges() {
        let shard = b"x".to_vec();
        let (mut private, _public) = audit_stream(1, &shard);
        let c = private.challenges[0].clone();
        private.strike(&c).unwrap();
        assert!(private.is_exhausted());
        assert_eq!(private.strike(&c).unwrap_err(), AuditError::InvalidChallenge);
    }
}
