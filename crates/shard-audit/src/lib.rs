//! Merkle-tree-plus-pre-image audit challenge/response proof of possession.

pub mod error;
pub mod merkle;
pub mod stream;

pub use error::{AuditError, Result};
pub use merkle::{padding_leaf, ripemd160_sha256, Hash, MerkleTree};
pub use stream::{audit_stream, proof_stream, verify, AuditPrivate, AuditPublic, Proof, ProofNode, VerifyOutcome};
