//! The protocol instance: one epoch of the anonymity protocol, bound to a
//! fixed roster, owning the library instance and driving its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use sda_library::{
    AnonymityLibrary, AnonymityLibraryFactory, LibraryConfig, LibraryMessage, LibraryOutbound,
    OutboundTarget, TimeoutHandler,
};
use sda_overlay::{MessageSender, OverlayTree};
use sda_transport::broadcast::BroadcastChannel;
use sda_transport::envelope::ProtocolMessage;
use sda_types::{IdentityMap, ProtocolParameters, Role};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::messages::MessageKind;
use crate::{ProtocolError, Result};

/// `New` is never observed from outside this crate: construction performs
/// the sanity checks and the role-specific library instantiation in one
/// step, so a successfully constructed instance is already `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InstanceState {
    Ready,
    Running,
    Stopped,
}

#[derive(Serialize)]
struct ParametersPayload {
    parameters: ProtocolParameters,
    force_params: bool,
}

/// One epoch of the anonymity protocol for a single participant.
pub struct ProtocolInstance {
    role: Role,
    parameters: ProtocolParameters,
    message_sender: Arc<MessageSender>,
    overlay: Arc<dyn OverlayTree>,
    broadcast: Option<Arc<dyn BroadcastChannel>>,
    library: StdMutex<Box<dyn AnonymityLibrary>>,
    state: StdMutex<InstanceState>,
    has_stopped: AtomicBool,
}

impl ProtocolInstance {
    /// Builds the message sender, runs the per-role sanity checks, and
    /// constructs the library instance via `factory`. Equivalent to
    /// `set_config`: a successfully returned instance is in the `Ready`
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Overlay`] if the message sender cannot be
    /// built (duplicate relay, or a non-relay role with no relay present),
    /// or [`ProtocolError::InsufficientRoster`] if the relay role is
    /// configured with fewer than one waiting client or trustee.
    pub fn new(
        role: Role,
        parameters: ProtocolParameters,
        identities: IdentityMap,
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: &dyn AnonymityLibraryFactory,
        timeout_handler: Option<TimeoutHandler>,
    ) -> Result<Self> {
        let message_sender = MessageSender::build(overlay.clone(), &identities, role)?;

        if role == Role::Relay
            && (message_sender.client_count() < 1 || message_sender.trustee_count() < 1)
        {
            return Err(ProtocolError::InsufficientRoster {
                clients: message_sender.client_count(),
                trustees: message_sender.trustee_count(),
            });
        }

        let library = factory.new_instance(
            role,
            LibraryConfig {
                identities,
                parameters: parameters.clone(),
                timeout_handler,
            },
        );

        Ok(Self {
            role,
            parameters,
            message_sender: Arc::new(message_sender),
            overlay,
            broadcast,
            library: StdMutex::new(library),
            state: StdMutex::new(InstanceState::Ready),
            has_stopped: AtomicBool::new(false),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_stopped(&self) -> bool {
        self.has_stopped.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        *self.state.lock().expect("instance state lock poisoned") == InstanceState::Running
    }

    /// Relay-only: synthesize the boot `ALL_ALL_PARAMETERS` message (with
    /// `force_params = true`) and self-deliver it, so the library boots
    /// identically regardless of role.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::StartRequiresRelay`] if called on a
    /// non-relay instance, or [`ProtocolError::AlreadyStopped`] if the
    /// instance has already been stopped.
    pub async fn start(&self) -> Result<()> {
        if self.role != Role::Relay {
            return Err(ProtocolError::StartRequiresRelay);
        }
        {
            let mut state = self.state.lock().expect("instance state lock poisoned");
            match *state {
                InstanceState::Stopped => return Err(ProtocolError::AlreadyStopped),
                InstanceState::Running => return Ok(()),
                InstanceState::Ready => *state = InstanceState::Running,
            }
        }

        let payload = sda_transport::cbor::to_vec(&ParametersPayload {
            parameters: self.parameters.clone(),
            force_params: true,
        })?;
        info!("starting protocol instance, self-delivering boot parameters");
        self.deliver_to_library(MessageKind::AllAllParameters.code(), payload)
            .await
    }

    /// Forward a message received from the overlay into this instance.
    /// A no-op once the instance has stopped.
    pub async fn dispatch(&self, envelope: ProtocolMessage) -> Result<()> {
        if self.has_stopped() {
            debug!("dispatch called on a stopped instance, ignoring");
            return Ok(());
        }
        let Some(kind) = MessageKind::from_code(envelope.msg_type) else {
            warn!(msg_type = envelope.msg_type, "unregistered message kind, dropping");
            return Ok(());
        };

        if kind == MessageKind::AllAllShutdown {
            return self.stop().await;
        }

        // A non-relay instance transitions to Running lazily on receipt of
        // the boot parameters.
        if kind == MessageKind::AllAllParameters && self.role != Role::Relay {
            let mut state = self.state.lock().expect("instance state lock poisoned");
            if *state == InstanceState::Ready {
                *state = InstanceState::Running;
            }
        }

        self.deliver_to_library(envelope.msg_type, envelope.payload)
            .await
    }

    async fn deliver_to_library(&self, msg_type: u16, payload: Vec<u8>) -> Result<()> {
        let outbound = {
            let mut library = self.library.lock().expect("library lock poisoned");
            library.received(LibraryMessage { msg_type, payload })?
        };
        for message in outbound {
            self.route_outbound(message).await?;
        }
        Ok(())
    }

    async fn route_outbound(&self, message: LibraryOutbound) -> Result<()> {
        match message.target {
            OutboundTarget::Relay => {
                self.message_sender
                    .send_raw_to_relay(message.msg_type, message.payload)
                    .await?;
            }
            OutboundTarget::Client(id) => {
                self.message_sender
                    .send_raw_to_client(id, message.msg_type, message.payload)
                    .await?;
            }
            OutboundTarget::Trustee(id) => {
                self.message_sender
                    .send_raw_to_trustee(id, message.msg_type, message.payload)
                    .await?;
            }
            OutboundTarget::BroadcastAllClients => {
                let Some(channel) = self.broadcast.as_ref() else {
                    warn!("library requested a broadcast but no broadcast channel is configured");
                    return Ok(());
                };
                self.message_sender
                    .broadcast_to_all_clients(channel.as_ref(), &message.payload)
                    .await?;
            }
        }
        Ok(())
    }

    /// Tear down this instance: forward `ALL_ALL_SHUTDOWN` into the
    /// library, mark the instance stopped, and shut down the overlay.
    /// Idempotent.
    pub async fn stop(&self) -> Result<()> {
        if self.has_stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("stopping protocol instance");
        {
            let mut state = self.state.lock().expect("instance state lock poisoned");
            *state = InstanceState::Stopped;
        }
        let outbound = {
            let mut library = self.library.lock().expect("library lock poisoned");
            let outbound = library.received(LibraryMessage {
                msg_type: MessageKind::AllAllShutdown.code(),
                payload: Vec::new(),
            })?;
            library.shutdown();
            outbound
        };
        for message in outbound {
            self.route_outbound(message).await?;
        }
        self.overlay.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sda_library::mock::MockLibraryFactory;
    use sda_overlay::InMemoryOverlayTree;
    use sda_types::{IdentityMapEntry, NodeIdentity};
    use std::net::SocketAddr;

    fn identity(key: u8, port: u16) -> NodeIdentity {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        NodeIdentity::new([key; 32], addr)
    }

    fn relay_identities() -> (Arc<InMemoryOverlayTree>, IdentityMap) {
        let relay = identity(0, 1000);
        let client = identity(1, 2000);
        let trustee = identity(2, 3000);
        let tree = Arc::new(InMemoryOverlayTree::new(vec![
            sda_overlay::TreeNode {
                identity: relay.clone(),
            },
            sda_overlay::TreeNode {
                identity: client.clone(),
            },
            sda_overlay::TreeNode {
                identity: trustee.clone(),
            },
        ]));
        let mut identities = IdentityMap::new();
        identities.insert(
            relay.key_string(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: relay,
            },
        );
        identities.insert(
            client.key_string(),
            IdentityMapEntry {
                role: Role::Client,
                numeric_id: 0,
                transport_identity: client,
            },
        );
        identities.insert(
            trustee.key_string(),
            IdentityMapEntry {
                role: Role::Trustee,
                numeric_id: 0,
                transport_identity: trustee,
            },
        );
        (tree, identities)
    }

    #[tokio::test]
    async fn relay_construction_requires_a_client_and_a_trustee() {
        let relay = identity(0, 1000);
        let tree = Arc::new(InMemoryOverlayTree::new(vec![sda_overlay::TreeNode {
            identity: relay.clone(),
        }]));
        let mut identities = IdentityMap::new();
        identities.insert(
            relay.key_string(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: relay,
            },
        );
        let factory = MockLibraryFactory;
        let err = ProtocolInstance::new(
            Role::Relay,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InsufficientRoster { .. }));
    }

    #[tokio::test]
    async fn relay_start_self_delivers_parameters() {
        let (tree, identities) = relay_identities();
        let factory = MockLibraryFactory;
        let instance = ProtocolInstance::new(
            Role::Relay,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap();

        instance.start().await.unwrap();
        assert!(instance.is_running());
    }

    #[tokio::test]
    async fn non_relay_cannot_start() {
        let (tree, identities) = relay_identities();
        let factory = MockLibraryFactory;
        let instance = ProtocolInstance::new(
            Role::Client,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap();
        let err = instance.start().await.unwrap_err();
        assert!(matches!(err, ProtocolError::StartRequiresRelay));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (tree, identities) = relay_identities();
        let factory = MockLibraryFactory;
        let instance = ProtocolInstance::new(
            Role::Relay,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap();
        instance.start().await.unwrap();
        instance.stop().await.unwrap();
        instance.stop().await.unwrap();
        assert!(instance.has_stopped());
    }

    #[tokio::test]
    async fn dispatch_is_a_no_op_after_stop() {
        let (tree, identities) = relay_identities();
        let factory = MockLibraryFactory;
        let instance = ProtocolInstance::new(
            Role::Relay,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap();
        instance.stop().await.unwrap();

        let envelope = ProtocolMessage::new_raw(MessageKind::CliRelUpstreamData.code(), vec![1])
            .unwrap();
        instance.dispatch(envelope).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_message_stops_the_instance() {
        let (tree, identities) = relay_identities();
        let factory = MockLibraryFactory;
        let instance = ProtocolInstance::new(
            Role::Relay,
            ProtocolParameters::default(),
            identities,
            tree,
            None,
            &factory,
            None,
        )
        .unwrap();
        instance.start().await.unwrap();

        let envelope = ProtocolMessage::new_raw(MessageKind::AllAllShutdown.code(), vec![]).unwrap();
        instance.dispatch(envelope).await.unwrap();
        assert!(instance.has_stopped());
    }
}
