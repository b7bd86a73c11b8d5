//! The per-node service actor: config loading, the control-message
//! handlers, the reconnection supervisors, and the CLI subcommands that
//! wire a relay/client/trustee node together out of the lower crates.

pub mod commands;
pub mod config;
pub mod lifecycle;
pub mod messages;
pub mod supervisor;

pub use lifecycle::ServiceState;

/// Errors raised while assembling or operating a node's service actor.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("churn error: {0}")]
    Churn(#[from] sda_churn::ChurnError),

    #[error("protocol error: {0}")]
    Protocol(#[from] sda_protocol::ProtocolError),

    #[error("overlay error: {0}")]
    Overlay(#[from] sda_overlay::OverlayError),

    #[error("transport error: {0}")]
    Transport(#[from] sda_transport::TransportError),

    #[error("types error: {0}")]
    Types(#[from] sda_types::TypesError),

    #[error("peer announced protocol version {actual:?}, expected {expected:?}")]
    ProtocolVersionMismatch { expected: String, actual: String },

    #[error("this operation is only valid for the relay role")]
    RelayOnly,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
