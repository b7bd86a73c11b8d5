//! The peer-to-peer tree overlay boundary and the message sender built on
//! top of it.
//!
//! The overlay itself (tree construction, framed typed unicast, RPC
//! substrate) is an external collaborator; this crate only models the
//! interface it must expose to the wrapper, plus an in-memory test double
//! standing in for it.

pub mod sender;
pub mod tree;

pub use sender::MessageSender;
pub use tree::{InMemoryOverlayTree, OverlayTree};

use sda_types::NodeIdentity;

/// Errors raised while building or using the overlay/message-sender layer.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("multiple relay entries found while building the message sender")]
    DuplicateRelay,

    #[error("local role requires a relay peer, but none was found in the identity map")]
    RelayRequired,

    #[error("no peer bound for {0:?}")]
    UnknownPeer(PeerRef),

    #[error("fast channel not ready for {0:?}")]
    NotReady(PeerRef),

    #[error("transport error: {0}")]
    Transport(#[from] sda_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, OverlayError>;

/// Identifies a logical peer slot addressed by role + numeric index (or the
/// relay, which has none).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerRef {
    Relay,
    Client(u32),
    Trustee(u32),
}

/// A peer seen while scanning the overlay tree, before classification.
#[derive(Clone, Debug)]
pub struct TreeNode {
    pub identity: NodeIdentity,
}
