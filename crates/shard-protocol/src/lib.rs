//! overlay RPC handlers binding the storage contract, audit, and transfer
//! crates to the opaque overlay transport.

pub mod error;
pub mod handlers;
pub mod overlay;

pub use error::{ProtocolError, Result, ShardErrorBody, ShardErrorEnvelope};
pub use handlers::{ProtocolHandler, DEFAULT_CONSIGN_THRESHOLD_MS};
pub use overlay::{
    AuditRequest, AuditResponse, ConsignRequest, ConsignResponse, MirrorReport, MirrorRequest,
    OfferRequest, OfferResponse, Overlay, RenewRequest, RenewResponse, RetrieveRequest,
    RetrieveResponse,
};
