//! contract validation and signing errors

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// a required field was missing for the requested operation
    MissingField(&'static str),
    /// a field's value violated the schema (hex format, range, ordering)
    InvalidField { field: &'static str, reason: String },
    /// `store_begin` was not strictly before `store_end`
    InvalidStoreWindow,
    /// an HD index was hardened or out of the non-hardened range
    InvalidHdIndex(u32),
    /// attempted to sign or verify with an unknown actor name
    UnknownActor(String),
    /// signature was malformed or did not decode
    MalformedSignature,
    /// canonical JSON encoding/decoding failed
    Encoding(String),
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(f2) => write!(f, "missing required field: {}", f2),
            Self::InvalidField { field, reason } => {
                write!(f, "invalid field {}: {}", field, reason)
            }
            Self::InvalidStoreWindow => write!(f, "store_begin must be before store_end"),
            Self::InvalidHdIndex(i) => write!(f, "hd index {} must be non-hardened (< 2^31)", i),
            Self::UnknownActor(a) => write!(f, "unknown actor: {}", a),
            Self::MalformedSignature => write!(f, "malformed signature"),
            Self::Encoding(e) => write!(f, "encoding error: {}", e),
        }
    }
}

impl std::error::Error for ContractError {}

pub type Result<T> = std::result::Result<T, ContractError>;
