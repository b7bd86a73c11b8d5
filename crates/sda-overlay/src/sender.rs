//! Role- and index-addressed unicast to peers over the overlay, plus the
//! optional fast TCP side-channel for one hot pair and the UDP broadcast
//! fan-out to all clients.

use std::collections::HashMap;
use std::sync::Arc;

use sda_transport::broadcast::BroadcastChannel;
use sda_transport::envelope::{ProtocolMessage, WireMessage};
use sda_transport::fast_channel::FastChannelConnection;
use sda_types::{IdentityMap, NodeIdentity, Role};
use tokio::sync::watch;
use tracing::warn;

use crate::tree::OverlayTree;
use crate::{OverlayError, PeerRef, Result};

/// Built once per epoch from the overlay tree and the current identity map.
pub struct MessageSender {
    tree: Arc<dyn OverlayTree>,
    relay: Option<NodeIdentity>,
    clients: HashMap<u32, NodeIdentity>,
    trustees: HashMap<u32, NodeIdentity>,
    fast_to_relay: Option<Arc<FastChannelConnection>>,
    fast_to_clients: HashMap<u32, Arc<FastChannelConnection>>,
}

impl MessageSender {
    /// Scan `tree.nodes()`, classify each by looking it up in `identities`
    /// by its public-key string, and place it into the relay slot or the
    /// `clients`/`trustees` map under its identity map's own `numeric_id`
    /// (never a freshly counted traversal index - see `DESIGN.md` for why
    /// that distinction matters).
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::DuplicateRelay`] if more than one tree node
    /// maps to the relay role, or [`OverlayError::RelayRequired`] if
    /// `local_role` is not `Relay` and no relay peer was found.
    pub fn build(
        tree: Arc<dyn OverlayTree>,
        identities: &IdentityMap,
        local_role: Role,
    ) -> Result<Self> {
        let mut relay = None;
        let mut clients = HashMap::new();
        let mut trustees = HashMap::new();

        for node in tree.nodes() {
            let key = node.identity.key_string();
            let Some(entry) = identities.get(&key) else {
                warn!(peer = %node.identity, "skipping peer not present in identity map");
                continue;
            };
            match entry.role {
                Role::Relay => {
                    if relay.is_some() {
                        return Err(OverlayError::DuplicateRelay);
                    }
                    relay = Some(node.identity);
                }
                Role::Client => {
                    clients.insert(entry.numeric_id, node.identity);
                }
                Role::Trustee => {
                    trustees.insert(entry.numeric_id, node.identity);
                }
            }
        }

        if local_role != Role::Relay && relay.is_none() {
            return Err(OverlayError::RelayRequired);
        }

        Ok(Self {
            tree,
            relay,
            clients,
            trustees,
            fast_to_relay: None,
            fast_to_clients: HashMap::new(),
        })
    }

    /// Install the fast TCP side-channel to the relay (client/trustee side).
    pub fn set_fast_channel_to_relay(&mut self, connection: Arc<FastChannelConnection>) {
        self.fast_to_relay = Some(connection);
    }

    /// Install the fast TCP side-channel to a specific client (relay side).
    pub fn set_fast_channel_to_client(&mut self, client_id: u32, connection: Arc<FastChannelConnection>) {
        self.fast_to_clients.insert(client_id, connection);
    }

    pub async fn send_to_client<M: WireMessage>(&self, client_id: u32, msg: &M) -> Result<()> {
        let identity = self
            .clients
            .get(&client_id)
            .ok_or(OverlayError::UnknownPeer(PeerRef::Client(client_id)))?;
        self.send_typed(identity, msg).await
    }

    pub async fn send_to_trustee<M: WireMessage>(&self, trustee_id: u32, msg: &M) -> Result<()> {
        let identity = self
            .trustees
            .get(&trustee_id)
            .ok_or(OverlayError::UnknownPeer(PeerRef::Trustee(trustee_id)))?;
        self.send_typed(identity, msg).await
    }

    pub async fn send_to_relay<M: WireMessage>(&self, msg: &M) -> Result<()> {
        let identity = self
            .relay
            .as_ref()
            .ok_or(OverlayError::UnknownPeer(PeerRef::Relay))?;
        self.send_typed(identity, msg).await
    }

    async fn send_typed<M: WireMessage>(&self, to: &NodeIdentity, msg: &M) -> Result<()> {
        let envelope = ProtocolMessage::from_typed(msg)?;
        self.tree.send(to, envelope).await
    }

    /// Send a message addressed only by its wire-vocabulary code, for
    /// callers that carry an opaque payload rather than a concrete
    /// [`WireMessage`] type (the protocol dispatcher's closed message set).
    pub async fn send_raw_to_client(&self, client_id: u32, msg_type: u16, payload: Vec<u8>) -> Result<()> {
        let identity = self
            .clients
            .get(&client_id)
            .ok_or(OverlayError::UnknownPeer(PeerRef::Client(client_id)))?;
        let envelope = ProtocolMessage::new_raw(msg_type, payload)?;
        self.tree.send(identity, envelope).await
    }

    pub async fn send_raw_to_trustee(&self, trustee_id: u32, msg_type: u16, payload: Vec<u8>) -> Result<()> {
        let identity = self
            .trustees
            .get(&trustee_id)
            .ok_or(OverlayError::UnknownPeer(PeerRef::Trustee(trustee_id)))?;
        let envelope = ProtocolMessage::new_raw(msg_type, payload)?;
        self.tree.send(identity, envelope).await
    }

    pub async fn send_raw_to_relay(&self, msg_type: u16, payload: Vec<u8>) -> Result<()> {
        let identity = self
            .relay
            .as_ref()
            .ok_or(OverlayError::UnknownPeer(PeerRef::Relay))?;
        let envelope = ProtocolMessage::new_raw(msg_type, payload)?;
        self.tree.send(identity, envelope).await
    }

    /// Send a downstream cell directly to a client over the fast channel.
    pub async fn fast_send_to_client(&self, client_id: u32, cell: &[u8]) -> Result<()> {
        let connection = self
            .fast_to_clients
            .get(&client_id)
            .ok_or(OverlayError::NotReady(PeerRef::Client(client_id)))?;
        connection.send(cell).await.map_err(OverlayError::from)
    }

    /// Send an upstream cell directly to the relay over the fast channel.
    pub async fn fast_send_to_relay(&self, cell: &[u8]) -> Result<()> {
        let connection = self
            .fast_to_relay
            .as_ref()
            .ok_or(OverlayError::NotReady(PeerRef::Relay))?;
        connection.send(cell).await.map_err(OverlayError::from)
    }

    /// Broadcast a downstream cell to every client over the UDP channel.
    pub async fn broadcast_to_all_clients<C: BroadcastChannel + ?Sized>(
        &self,
        channel: &C,
        cell: &[u8],
    ) -> Result<()> {
        channel.broadcast(cell).await.map_err(OverlayError::from)
    }

    /// Start a per-client subscription to the UDP broadcast channel. Blocks
    /// until `start_stop` carries `false`, so callers spawn this as its own
    /// task. `client_id` is accepted for parity with the other per-client
    /// operations but does not change the subscription itself: every client
    /// listens on the same multicast group. This channel follows the
    /// start/stop naming literally (`true` means keep listening, `false`
    /// means terminate), the opposite polarity from
    /// [`sda_transport::broadcast::subscribe_and_loop`]'s own cancel-token
    /// convention, which is why `false` is passed as its `stop_on` value.
    pub async fn client_subscribe_to_broadcast<C, F>(
        &self,
        client_id: u32,
        channel: &C,
        mut on_message: F,
        start_stop: watch::Receiver<bool>,
    ) where
        C: BroadcastChannel + ?Sized,
        F: FnMut(Vec<u8>),
    {
        tracing::debug!(client_id, "subscribing to broadcast channel");
        sda_transport::broadcast::subscribe_and_loop(
            channel,
            move |payload| on_message(payload),
            start_stop,
            false,
        )
        .await;
        tracing::debug!(client_id, "broadcast subscription stopped");
    }

    pub fn has_relay(&self) -> bool {
        self.relay.is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn trustee_count(&self) -> usize {
        self.trustees.len()
    }
}
