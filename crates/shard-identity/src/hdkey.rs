//! non-hardened BIP32-style public key derivation
//!
//! A renter's contract carries an extended public key plus a non-hardened
//! index (< 2^31). Only non-hardened child public-key derivation is needed
//! here; hardened derivation requires the private key and never applies to
//! a renter's published extended key.

use crate::error::{IdentityError, Result};
use hmac::{Hmac, Mac};
use k256::ecdsa::VerifyingKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, ProjectivePoint, PublicKey, Scalar};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

const HARDENED_BOUNDARY: u32 = 1 << 31;

/// an extended public key: a secp256k1 public key plus a 32-byte chain code
#[derive(Clone)]
pub struct ExtendedPublicKey {
    public_key: PublicKey,
    chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    pub fn new(public_key: VerifyingKey, chain_code: [u8; 32]) -> Self {
        Self {
            public_key: PublicKey::from(public_key),
            chain_code,
        }
    }

    /// parse from the 33-byte compressed point followed by the 32-byte chain code
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(IdentityError::InvalidExtendedKey);
        }
        let public_key =
            PublicKey::from_sec1_bytes(&bytes[..33]).map_err(|_| IdentityError::InvalidExtendedKey)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[33..]);
        Ok(Self {
            public_key,
            chain_code,
        })
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..33].copy_from_slice(self.public_key.to_encoded_point(true).as_bytes());
        out[33..].copy_from_slice(&self.chain_code);
        out
    }

    /// derive the non-hardened child public key at `index`
    pub fn derive_child(&self, index: u32) -> Result<VerifyingKey> {
        if index >= HARDENED_BOUNDARY {
            return Err(IdentityError::InvalidHdIndex(index));
        }

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .expect("hmac accepts any key length");
        mac.update(self.public_key.to_encoded_point(true).as_bytes());
        mac.update(&index.to_be_bytes());
        let i = mac.finalize().into_bytes();

        let il_bytes: [u8; 32] = i[..32].try_into().expect("hmac-sha512 output is 64 bytes");
        let il = Scalar::from_repr(il_bytes.into())
            .into_option()
            .ok_or(IdentityError::InvalidExtendedKey)?;

        let parent_point = ProjectivePoint::from(*self.public_key.as_affine());
        let child_point = ProjectivePoint::GENERATOR * il + parent_point;
        let child_affine: AffinePoint = child_point.into();

        VerifyingKey::from_affine(child_affine).map_err(|_| IdentityError::InvalidExtendedKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::NodeKeyPair;

    #[test]
    fn derive_child_is_deterministic_and_non_hardened_only() {
        let mut rng = rand::thread_rng();
        let kp = NodeKeyPair::generate(&mut rng);
        let ext = ExtendedPublicKey::new(kp.public_key(), [7u8; 32]);

        let child1 = ext.derive_child(0).unwrap();
        let child2 = ext.derive_child(0).unwrap();
        assert_eq!(child1, child2);

        let child3 = ext.derive_child(1).unwrap();
        assert_ne!(child1, child3);

        assert!(ext.derive_child(1 << 31).is_err());
    }

    #[test]
    fn extended_key_round_trips_through_bytes() {
        let mut rng = rand::thread_rng();
        let kp = NodeKeyPair::generate(&mut rng);
        let ext = ExtendedPublicKey::new(kp.public_key(), [9u8; 32]);
        let bytes = ext.to_bytes();
        let parsed = ExtendedPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(ext.derive_child(3).unwrap(), parsed.derive_child(3).unwrap());
    }
}
