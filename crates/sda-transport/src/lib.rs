//! Wire envelope, framing, and the broadcast/fast-channel transports used by
//! the SDA wrapper.
//!
//! ```text
//! Application
//!     |
//!     v
//! ProtocolMessage (envelope.rs)  -- CBOR envelope with version, type, payload
//!     |
//!     v
//! [4-byte big-endian length][payload]  (framing.rs)
//!     |
//!     v
//! UDP multicast (broadcast.rs) or TCP side-channel (fast_channel.rs)
//! ```

pub mod broadcast;
pub mod cbor;
pub mod envelope;
pub mod fast_channel;
pub mod framing;

/// Errors raised by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("side-channel not ready")]
    NotReady,
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
