//! secp256k1 node identity and bitcoin-style compact recoverable signatures

use crate::error::{IdentityError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// a secp256k1 node fingerprint: RIPEMD160(SHA256(compressed pubkey))
pub type Fingerprint = [u8; 20];

/// 65-byte bitcoin-style compact signature: 1 recovery byte + 32-byte r + 32-byte s
#[derive(Clone, PartialEq, Eq)]
pub struct CompactSignature(pub [u8; 65]);

impl CompactSignature {
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| IdentityError::InvalidEncoding(e.to_string()))?;
        let arr: [u8; 65] = bytes
            .try_into()
            .map_err(|_| IdentityError::MalformedSignature)?;
        Ok(Self(arr))
    }

    fn recovery_id(&self) -> Result<RecoveryId> {
        RecoveryId::from_byte(self.0[0]).ok_or(IdentityError::MalformedSignature)
    }

    fn signature(&self) -> Result<Signature> {
        Signature::from_slice(&self.0[1..]).map_err(|_| IdentityError::MalformedSignature)
    }
}

/// hash a compressed pubkey (or any message) the way node identities and
/// shard keys are derived throughout this core: RIPEMD160(SHA256(bytes))
pub fn ripemd160_sha256(bytes: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(bytes);
    let rmd = Ripemd160::digest(sha);
    rmd.into()
}

pub fn fingerprint_of(pubkey: &VerifyingKey) -> Fingerprint {
    ripemd160_sha256(pubkey.to_encoded_point(true).as_bytes())
}

/// a node's secp256k1 keypair
pub struct NodeKeyPair {
    signing_key: SigningKey,
}

impl NodeKeyPair {
    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing_key: SigningKey::random(rng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let signing_key =
            SigningKey::from_bytes(bytes.into()).map_err(|_| IdentityError::InvalidExtendedKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_of(&self.public_key())
    }

    /// sign `message` (already-hashed signing bytes) producing a 65-byte
    /// compact recoverable signature. the message is hashed once more with
    /// SHA256 before signing, matching bitcoin's message-signing convention.
    pub fn sign_compact(&self, message: &[u8]) -> CompactSignature {
        let digest = Sha256::digest(message);
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .expect("prehash signing cannot fail for a 32-byte digest");
        let mut out = [0u8; 65];
        out[0] = recid.to_byte();
        out[1..].copy_from_slice(&sig.to_bytes());
        CompactSignature(out)
    }
}

/// recover the signer's public key from a message and compact signature
pub fn recover(message: &[u8], sig: &CompactSignature) -> Result<VerifyingKey> {
    let digest = Sha256::digest(message);
    let signature = sig.signature()?;
    let recid = sig.recovery_id()?;
    VerifyingKey::recover_from_prehash(&digest, &signature, recid)
        .map_err(|_| IdentityError::RecoveryFailed)
}

/// verify that `sig` over `message` was produced by `pubkey`
pub fn verify_with(message: &[u8], sig: &CompactSignature, pubkey: &VerifyingKey) -> bool {
    let digest = Sha256::digest(message);
    match sig.signature() {
        Ok(signature) => pubkey.verify_prehash(&digest, &signature).is_ok(),
        Err(_) => false,
    }
}

/// verify that `sig` over `message` recovers to the given identity fingerprint
pub fn verify_fingerprint(message: &[u8], sig: &CompactSignature, identity: &Fingerprint) -> bool {
    match recover(message, sig) {
        Ok(pk) => &fingerprint_of(&pk) == identity,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_round_trip() {
        let mut rng = rand::thread_rng();
        let kp = NodeKeyPair::generate(&mut rng);
        let msg = b"consign this shard";

        let sig = kp.sign_compact(msg);
        let recovered = recover(msg, &sig).unwrap();
        assert_eq!(recovered, kp.public_key());
        assert!(verify_with(msg, &sig, &kp.public_key()));
        assert!(verify_fingerprint(msg, &sig, &kp.fingerprint()));
    }

    #[test]
    fn tampered_message_fails_fingerprint_check() {
        let mut rng = rand::thread_rng();
        let kp = NodeKeyPair::generate(&mut rng);
        let sig = kp.sign_compact(b"original");
        assert!(!verify_fingerprint(b"tampered", &sig, &kp.fingerprint()));
    }

    #[test]
    fn base64_round_trip() {
        let mut rng = rand::thread_rng();
        let kp = NodeKeyPair::generate(&mut rng);
        let sig = kp.sign_compact(b"hello");
        let encoded = sig.to_base64();
        let decoded = CompactSignature::from_base64(&encoded).unwrap();
        assert!(decoded == sig);
    }

    #[test]
    fn wrong_identity_fails() {
        let mut rng = rand::thread_rng();
        let kp1 = NodeKeyPair::generate(&mut rng);
        let kp2 = NodeKeyPair::generate(&mut rng);
        let sig = kp1.sign_compact(b"msg");
        assert!(!verify_fingerprint(b"msg", &sig, &kp2.fingerprint()));
    }
}
