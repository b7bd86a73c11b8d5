//! Shared domain types for the SDA (Scalable Dissent Architecture) wrapper.
//!
//! These structures correspond 1:1 with the data model described for the
//! relay/client/trustee coordination layer: node identity, role, the
//! per-epoch waiting sets and roster, and the operational protocol
//! parameters carried in `ALL_ALL_PARAMETERS`.

pub mod identity;
pub mod params;
pub mod roster;

pub use identity::{NodeIdentity, Role};
pub use params::ProtocolParameters;
pub use roster::{IdentityMap, IdentityMapEntry, Roster, WaitingEntry};

/// Errors raised while constructing or validating domain types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A node identity's public-key bytes were not a valid length.
    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidPublicKeyLength(usize),

    /// A transport address string failed to parse.
    #[error("invalid transport address {0:?}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),
}

/// Result alias for this crate's fallible constructors.
pub type Result<T> = std::result::Result<T, TypesError>;
