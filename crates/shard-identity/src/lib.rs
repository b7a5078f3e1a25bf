//! node identity: secp256k1 keys, compact recoverable signatures, and
//! non-hardened HD public key derivation for renter-side key rotation.

pub mod error;
pub mod hdkey;
pub mod keypair;

pub use error::{IdentityError, Result};
pub use hdkey::ExtendedPublicKey;
pub use keypair::{
    fingerprint_of, recover, ripemd160_sha256, verify_fingerprint, verify_with, CompactSignature,
    Fingerprint, NodeKeyPair,
};

/// hex-encode a fingerprint the way contract identities are serialized
pub fn fingerprint_to_hex(fp: &Fingerprint) -> String {
    hex::encode(fp)
}

/// parse a hex-encoded fingerprint
pub fn fingerprint_from_hex(s: &str) -> Result<Fingerprint> {
    let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidEncoding(e.to_string()))?;
    bytes.try_into().map_err(|_| IdentityError::InvalidExtendedKey)
}
