//! The overlay tree: a spanning tree rooted at the relay, over which typed
//! messages are unicast between peers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sda_transport::envelope::ProtocolMessage;
use sda_types::NodeIdentity;

use crate::{Result, TreeNode};

/// The overlay's interface as seen by the message sender: enumerate the
/// participants reachable through this tree, and send a framed, typed
/// message to one of them.
#[async_trait]
pub trait OverlayTree: Send + Sync {
    /// All tree nodes this overlay instance can reach, in the order the
    /// overlay discovered them (used only for message-sender construction,
    /// not for roster ordering, which is the churn controller's
    /// responsibility).
    fn nodes(&self) -> Vec<TreeNode>;

    /// Send an already-enveloped message to a specific peer.
    async fn send(&self, to: &NodeIdentity, message: ProtocolMessage) -> Result<()>;

    /// Tear down this tree's resources. Idempotent.
    async fn shutdown(&self);
}

/// An in-memory overlay used for tests: `nodes()` is fixed at construction
/// time, and `send` simply appends to a per-recipient inbox.
#[derive(Default)]
pub struct InMemoryOverlayTree {
    nodes: Vec<TreeNode>,
    inboxes: Mutex<HashMap<String, Vec<ProtocolMessage>>>,
}

impl InMemoryOverlayTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self {
            nodes,
            inboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Drain all messages delivered to `identity` so far.
    pub fn take_inbox(&self, identity: &NodeIdentity) -> Vec<ProtocolMessage> {
        self.inboxes
            .lock()
            .expect("inbox lock poisoned")
            .remove(&identity.key_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OverlayTree for InMemoryOverlayTree {
    fn nodes(&self) -> Vec<TreeNode> {
        self.nodes.clone()
    }

    async fn send(&self, to: &NodeIdentity, message: ProtocolMessage) -> Result<()> {
        self.inboxes
            .lock()
            .expect("inbox lock poisoned")
            .entry(to.key_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn identity(key: u8, port: u16) -> NodeIdentity {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        NodeIdentity::new([key; 32], addr)
    }

    #[tokio::test]
    async fn delivers_to_the_right_inbox() {
        let alice = identity(1, 1000);
        let bob = identity(2, 1001);
        let tree = InMemoryOverlayTree::new(vec![
            TreeNode {
                identity: alice.clone(),
            },
            TreeNode {
                identity: bob.clone(),
            },
        ]);

        let msg = ProtocolMessage {
            version: 1,
            msg_type: 7,
            msg_id: [0; 16],
            timestamp: 0,
            payload: vec![],
        };
        tree.send(&alice, msg.clone()).await.unwrap();

        assert_eq!(tree.take_inbox(&alice).len(), 1);
        assert!(tree.take_inbox(&bob).is_empty());
        // Draining is destructive.
        assert!(tree.take_inbox(&alice).is_empty());
    }
}
