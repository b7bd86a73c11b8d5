//! The trait boundary standing in for the external DC-net/shuffle
//! anonymity library.
//!
//! This crate defines only the interface the SDA wrapper speaks to: a
//! single `received` entry point fed by the message dispatcher, a
//! `shutdown` hook, and a role-specific construction factory. The
//! cryptographic core itself (DC-net correctness, shuffle soundness) is
//! explicitly out of scope; see [`mock`] for the deterministic test double
//! used to exercise the wrapper's plumbing without real cryptography.

pub mod mock;

use sda_types::{IdentityMap, ProtocolParameters, Role};

/// An opaque, transport-envelope-stripped message handed to the library.
/// `msg_type` identifies which member of the closed wire vocabulary this
/// is; `payload` is the CBOR-encoded message body.
#[derive(Clone, Debug)]
pub struct LibraryMessage {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

/// Where an outbound message produced by the library should be routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundTarget {
    Relay,
    Client(u32),
    Trustee(u32),
    BroadcastAllClients,
}

/// A message the library wants the wrapper to send on its behalf.
#[derive(Clone, Debug)]
pub struct LibraryOutbound {
    pub target: OutboundTarget,
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

/// Invoked by the library when one or more participants fail to submit
/// their round ciphertext in time. Carries the numeric IDs of delinquent
/// clients and trustees.
pub type TimeoutHandler = Box<dyn Fn(&[u32], &[u32]) + Send + Sync>;

/// Errors the library may surface back to the wrapper.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("library rejected message of type {0}")]
    Rejected(u16),

    #[error("library reported an internal failure: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

/// Per-epoch configuration handed to the library factory.
pub struct LibraryConfig {
    pub identities: IdentityMap,
    pub parameters: ProtocolParameters,
    pub timeout_handler: Option<TimeoutHandler>,
}

/// One running instance of the anonymity library, owned exclusively by a
/// single protocol instance for the lifetime of one epoch.
pub trait AnonymityLibrary: Send {
    /// Deliver one dispatched message into the library. May produce zero or
    /// more outbound messages for the wrapper to route.
    fn received(&mut self, msg: LibraryMessage) -> Result<Vec<LibraryOutbound>>;

    /// Terminal shutdown signal (delivered as `ALL_ALL_SHUTDOWN` by the
    /// dispatcher before the protocol instance marks itself stopped).
    fn shutdown(&mut self);
}

/// Constructs a fresh library instance for a given role. The anonymity
/// library provides three concrete factories (relay, client, trustee); this
/// crate only requires that callers supply one that implements this trait.
pub trait AnonymityLibraryFactory: Send + Sync {
    fn new_instance(&self, role: Role, config: LibraryConfig) -> Box<dyn AnonymityLibrary>;
}
