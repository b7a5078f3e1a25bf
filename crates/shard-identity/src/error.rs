//! identity error types

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// signature bytes were not a valid compact (65-byte) signature
    MalformedSignature,
    /// recovery failed to produce a valid public key
    RecoveryFailed,
    /// base64 payload could not be decoded
    InvalidEncoding(String),
    /// HD index was hardened or out of the non-hardened range (>= 2^31)
    InvalidHdIndex(u32),
    /// extended key bytes were malformed
    InvalidExtendedKey,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSignature => write!(f, "malformed compact signature"),
            Self::RecoveryFailed => write!(f, "failed to recover public key from signature"),
            Self::InvalidEncoding(e) => write!(f, "invalid encoding: {}", e),
            Self::InvalidHdIndex(i) => write!(f, "hd index {} must be non-hardened (< 2^31)", i),
            Self::InvalidExtendedKey => write!(f, "invalid extended public key"),
        }
    }
}

impl std::error::Error for IdentityError {}

pub type Result<T> = std::result::Result<T, IdentityError>;
