//! audit pipeline errors

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// the requested challenge's leaf does not appear in the published leaves
    InvalidChallenge,
    /// a challenge or leaf string was not valid hex
    MalformedHex,
    /// the proof's nesting depth did not match the tree depth it claims
    DepthMismatch { proof_depth: usize, expected: usize },
    /// no challenges remain for this shard; renew or abandon it
    ChallengesExhausted,
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChallenge => write!(f, "invalid challenge"),
            Self::MalformedHex => write!(f, "malformed hex string"),
            Self::DepthMismatch { proof_depth, expected } => write!(
                f,
                "proof depth {} does not match expected depth {}",
                proof_depth, expected
            ),
            Self::ChallengesExhausted => write!(f, "no audit challenges remain for this shard"),
        }
    }
}

impl std::error::Error for AuditError {}

pub type Result<T> = std::result::Result<T, AuditError>;
