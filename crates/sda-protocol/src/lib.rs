//! The typed wire vocabulary, the message dispatcher, and the protocol
//! instance state machine: one epoch of the anonymity protocol per
//! participant, bound to a fixed roster and built on top of the message
//! sender and the anonymity-library trait boundary.

pub mod instance;
pub mod messages;

pub use instance::ProtocolInstance;
pub use messages::MessageKind;

/// Errors raised while constructing or operating a protocol instance.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("overlay error: {0}")]
    Overlay(#[from] sda_overlay::OverlayError),

    #[error("transport error: {0}")]
    Transport(#[from] sda_transport::TransportError),

    #[error("library error: {0}")]
    Library(#[from] sda_library::LibraryError),

    #[error("relay role requires at least one waiting client and one waiting trustee, found {clients} clients and {trustees} trustees")]
    InsufficientRoster { clients: usize, trustees: usize },

    #[error("start() is only valid on the relay's protocol instance")]
    StartRequiresRelay,

    #[error("protocol instance has already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
