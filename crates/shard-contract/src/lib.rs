//! storage contracts: schema-validated, signable storage-custody agreements.

pub mod contract;
pub mod error;

pub use contract::{Actor, Contract, Field, CONTRACT_TYPE};
pub use error::{ContractError, Result};
