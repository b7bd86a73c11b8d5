//! The relay-side membership/churn controller: waiting sets for clients and
//! trustees, dense per-epoch numeric ID assignment, and the decision of
//! when to (re)start or stop the protocol instance.

pub mod controller;
pub mod waiting;

pub use controller::{ChurnController, ProtocolLifecycle};
pub use waiting::WaitingSet;

/// Errors raised while constructing or operating the churn controller.
#[derive(Debug, thiserror::Error)]
pub enum ChurnError {
    #[error("relay identity is also listed as a trustee")]
    RelayIsTrustee,
}

pub type Result<T> = std::result::Result<T, ChurnError>;
