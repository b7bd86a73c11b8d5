//! The relay's protocol lifecycle (bridging the churn controller to a
//! concrete protocol instance) and the per-node service actor built on top
//! of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use sda_churn::{ChurnController, ProtocolLifecycle};
use sda_library::{AnonymityLibraryFactory, TimeoutHandler};
use sda_overlay::OverlayTree;
use sda_protocol::ProtocolInstance;
use sda_transport::broadcast::BroadcastChannel;
use sda_transport::envelope::ProtocolMessage;
use sda_types::{IdentityMap, IdentityMapEntry, NodeIdentity, ProtocolParameters, Role};

use crate::messages::{ConnectionRequest, HelloMsg};
use crate::supervisor;
use crate::{Result, ServiceError};

/// Bridges [`ChurnController`]'s start/stop decisions to a concrete
/// [`ProtocolInstance`]. Holds only a [`Weak`] reference back to the churn
/// controller, set once after construction via [`Self::bind_churn`],
/// because the controller itself must hold a strong `Arc<dyn
/// ProtocolLifecycle>` at construction time - a strong reference in both
/// directions would leak the pair for the life of the process.
pub struct RelayLifecycle {
    overlay: Arc<dyn OverlayTree>,
    broadcast: Option<Arc<dyn BroadcastChannel>>,
    factory: Arc<dyn AnonymityLibraryFactory>,
    parameters: ProtocolParameters,
    churn: OnceLock<Weak<ChurnController>>,
    current: Mutex<Option<Arc<ProtocolInstance>>>,
}

impl RelayLifecycle {
    pub fn new(
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: Arc<dyn AnonymityLibraryFactory>,
        parameters: ProtocolParameters,
    ) -> Self {
        Self {
            overlay,
            broadcast,
            factory,
            parameters,
            churn: OnceLock::new(),
            current: Mutex::new(None),
        }
    }

    /// Must be called exactly once, immediately after the owning
    /// [`ChurnController`] is constructed with this lifecycle already
    /// behind an `Arc`.
    pub fn bind_churn(&self, churn: Weak<ChurnController>) {
        let _ = self.churn.set(churn);
    }

    fn churn_weak(&self) -> Weak<ChurnController> {
        self.churn.get().cloned().unwrap_or_else(Weak::new)
    }

    /// Forward an already-classified envelope into the currently running
    /// instance, if any.
    pub async fn dispatch(&self, envelope: ProtocolMessage) -> Result<()> {
        let guard = self.current.lock().await;
        if let Some(instance) = guard.as_ref() {
            instance.dispatch(envelope).await?;
        }
        Ok(())
    }

    /// Best-effort, non-blocking liveness check for the reconnection
    /// supervisor's scheduling closure, which cannot await the async
    /// instance mutex. A momentarily contended lock reads as "not
    /// running", which only costs one redundant `HelloMsg` resend.
    pub fn is_running_sync(&self) -> bool {
        self.current
            .try_lock()
            .map(|guard| guard.as_ref().map(|i| !i.has_stopped()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn timeout_handler(&self) -> TimeoutHandler {
        let churn = self.churn_weak();
        Box::new(move |clients, trustees| {
            warn!(?clients, ?trustees, "round timeout, resetting the epoch");
            if let Some(churn) = churn.upgrade() {
                tokio::spawn(async move {
                    churn.handle_unknown_disconnection().await;
                });
            }
        })
    }
}

#[async_trait]
impl ProtocolLifecycle for RelayLifecycle {
    async fn start(&self) {
        let Some(churn) = self.churn_weak().upgrade() else {
            warn!("relay lifecycle asked to start before the churn controller was bound");
            return;
        };
        let identities = churn.create_identities_map().await;
        let instance = match ProtocolInstance::new(
            Role::Relay,
            self.parameters.clone(),
            identities,
            self.overlay.clone(),
            self.broadcast.clone(),
            self.factory.as_ref(),
            Some(self.timeout_handler()),
        ) {
            Ok(instance) => Arc::new(instance),
            Err(e) => {
                warn!(error = %e, "failed to build the relay protocol instance");
                return;
            }
        };
        if let Err(e) = instance.start().await {
            warn!(error = %e, "failed to start the relay protocol instance");
            return;
        }
        *self.current.lock().await = Some(instance);
        info!("relay protocol instance started");
    }

    async fn stop(&self) {
        let instance = self.current.lock().await.take();
        if let Some(instance) = instance {
            if let Err(e) = instance.stop().await {
                warn!(error = %e, "error stopping the relay protocol instance");
            }
        }
    }

    async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|i| !i.has_stopped())
            .unwrap_or(false)
    }
}

struct Inner {
    role: Role,
    local_identity: NodeIdentity,
    relay_identity: Option<NodeIdentity>,
    overlay: Arc<dyn OverlayTree>,
    broadcast: Option<Arc<dyn BroadcastChannel>>,
    factory: Arc<dyn AnonymityLibraryFactory>,
    parameters: ProtocolParameters,
    churn: Option<Arc<ChurnController>>,
    relay_lifecycle: Option<Arc<RelayLifecycle>>,
    current_instance: Mutex<Option<Arc<ProtocolInstance>>>,
    received_hello: AtomicBool,
    supervisor_cancels: Mutex<Vec<watch::Sender<bool>>>,
}

/// The per-node service actor: holds this node's role and identity, the
/// overlay/broadcast/library collaborators, and (relay only) the churn
/// controller and its lifecycle bridge. Cheap to clone - every clone shares
/// the same underlying state, which is what lets the reconnection
/// supervisors and control-message handlers run as independent `'static`
/// tasks.
#[derive(Clone)]
pub struct ServiceState(Arc<Inner>);

impl ServiceState {
    pub fn new_relay(
        local_identity: NodeIdentity,
        trustee_identities: Vec<NodeIdentity>,
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: Arc<dyn AnonymityLibraryFactory>,
        parameters: ProtocolParameters,
    ) -> Result<Self> {
        let relay_lifecycle = Arc::new(RelayLifecycle::new(
            overlay.clone(),
            broadcast.clone(),
            factory.clone(),
            parameters.clone(),
        ));
        let churn = Arc::new(ChurnController::new(
            local_identity.clone(),
            trustee_identities,
            relay_lifecycle.clone(),
        )?);
        relay_lifecycle.bind_churn(Arc::downgrade(&churn));

        Ok(Self(Arc::new(Inner {
            role: Role::Relay,
            local_identity,
            relay_identity: None,
            overlay,
            broadcast,
            factory,
            parameters,
            churn: Some(churn),
            relay_lifecycle: Some(relay_lifecycle),
            current_instance: Mutex::new(None),
            received_hello: AtomicBool::new(false),
            supervisor_cancels: Mutex::new(Vec::new()),
        })))
    }

    fn new_peer(
        role: Role,
        local_identity: NodeIdentity,
        relay_identity: NodeIdentity,
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: Arc<dyn AnonymityLibraryFactory>,
        parameters: ProtocolParameters,
    ) -> Self {
        Self(Arc::new(Inner {
            role,
            local_identity,
            relay_identity: Some(relay_identity),
            overlay,
            broadcast,
            factory,
            parameters,
            churn: None,
            relay_lifecycle: None,
            current_instance: Mutex::new(None),
            received_hello: AtomicBool::new(false),
            supervisor_cancels: Mutex::new(Vec::new()),
        }))
    }

    pub fn new_client(
        local_identity: NodeIdentity,
        relay_identity: NodeIdentity,
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: Arc<dyn AnonymityLibraryFactory>,
        parameters: ProtocolParameters,
    ) -> Self {
        Self::new_peer(
            Role::Client,
            local_identity,
            relay_identity,
            overlay,
            broadcast,
            factory,
            parameters,
        )
    }

    pub fn new_trustee(
        local_identity: NodeIdentity,
        relay_identity: NodeIdentity,
        overlay: Arc<dyn OverlayTree>,
        broadcast: Option<Arc<dyn BroadcastChannel>>,
        factory: Arc<dyn AnonymityLibraryFactory>,
        parameters: ProtocolParameters,
    ) -> Self {
        Self::new_peer(
            Role::Trustee,
            local_identity,
            relay_identity,
            overlay,
            broadcast,
            factory,
            parameters,
        )
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn local_identity(&self) -> &NodeIdentity {
        &self.0.local_identity
    }

    pub fn churn(&self) -> Option<&Arc<ChurnController>> {
        self.0.churn.as_ref()
    }

    /// relay -> trustee, first receipt only: stores nothing new (the
    /// trustee already knows the relay's identity from its group file) but
    /// triggers the trustee's own relay-connection supervisor, working
    /// around NAT/firewall directionality that may prevent the trustee
    /// from initiating contact on its own.
    pub async fn handle_hello(&self, from: &NodeIdentity) -> Result<()> {
        if self.0.role != Role::Trustee {
            return Ok(());
        }
        if self.0.received_hello.swap(true, Ordering::SeqCst) {
            debug!(peer = %from, "hello already received, ignoring");
            return Ok(());
        }
        info!(peer = %from, "received hello, starting relay connection supervisor");
        self.spawn_connect_to_relay_supervisor(from.clone()).await;
        Ok(())
    }

    /// peer -> relay. Fatal on a protocol version mismatch; otherwise
    /// forwarded to the churn controller.
    pub async fn handle_connection_request(
        &self,
        from: &NodeIdentity,
        protocol_version: &str,
    ) -> Result<()> {
        let Some(churn) = &self.0.churn else {
            return Ok(());
        };
        if protocol_version != self.0.parameters.protocol_version {
            return Err(ServiceError::ProtocolVersionMismatch {
                expected: self.0.parameters.protocol_version.clone(),
                actual: protocol_version.to_string(),
            });
        }
        churn.handle_connection(from).await;
        Ok(())
    }

    /// peer -> relay.
    pub async fn handle_disconnection_request(&self, from: &NodeIdentity) -> Result<()> {
        if let Some(churn) = &self.0.churn {
            churn.handle_disconnection(from).await;
        }
        Ok(())
    }

    /// relay -> all, non-relay side: stop this node's own protocol
    /// instance, if any.
    pub async fn handle_stop_protocol(&self) -> Result<()> {
        if self.0.role == Role::Relay {
            return Ok(());
        }
        let instance = self.0.current_instance.lock().await.take();
        if let Some(instance) = instance {
            instance.stop().await?;
        }
        Ok(())
    }

    /// relay -> clients: tear down the SOCKS subsystem. The subsystem
    /// itself is an external collaborator out of scope for this crate;
    /// this is the hook a concrete SOCKS implementation would observe.
    pub async fn handle_stop_socks(&self) {
        info!("received stop-socks, tearing down the SOCKS subsystem");
    }

    /// An overlay-reported transport fault with no specific peer attached,
    /// or a round timeout. Relay: churn-reset. Everyone else: cancel the
    /// relay supervisor and fall quiet.
    pub async fn handle_network_error(&self) {
        match self.0.role {
            Role::Relay => {
                if let Some(churn) = &self.0.churn {
                    churn.handle_unknown_disconnection().await;
                }
            }
            _ => {
                warn!("network error reported, cancelling reconnection supervisors");
                self.cancel_all_supervisors().await;
            }
        }
    }

    /// Non-relay protocol-instance factory: the overlay handed this node a
    /// tree it did not itself initiate. Builds an identity map containing
    /// only the relay entry (this role never addresses peers by numeric ID
    /// at this layer) and constructs a fresh instance.
    pub async fn build_protocol_instance(&self) -> Result<Arc<ProtocolInstance>> {
        if self.0.role == Role::Relay {
            return Err(ServiceError::RelayOnly);
        }
        let relay_identity = self
            .0
            .relay_identity
            .clone()
            .expect("non-relay ServiceState always carries a relay_identity");
        let mut identities = IdentityMap::new();
        identities.insert(
            relay_identity.key_string(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: relay_identity,
            },
        );
        let instance = Arc::new(ProtocolInstance::new(
            self.0.role,
            self.0.parameters.clone(),
            identities,
            self.0.overlay.clone(),
            self.0.broadcast.clone(),
            self.0.factory.as_ref(),
            None,
        )?);
        *self.0.current_instance.lock().await = Some(instance.clone());
        Ok(instance)
    }

    /// Forward a dispatched envelope into whichever instance this node
    /// currently owns (the relay's, via its lifecycle bridge, or this
    /// node's own).
    pub async fn dispatch(&self, envelope: ProtocolMessage) -> Result<()> {
        if let Some(lifecycle) = &self.0.relay_lifecycle {
            return lifecycle.dispatch(envelope).await;
        }
        let guard = self.0.current_instance.lock().await;
        if let Some(instance) = guard.as_ref() {
            instance.dispatch(envelope).await?;
        }
        Ok(())
    }

    /// Start the relay's own reconnection supervisor toward every
    /// configured trustee (one task per trustee, each re-announcing via
    /// `HelloMsg` every 30s while that trustee has not yet connected).
    pub async fn spawn_connect_to_trustees_supervisors(&self, trustees: &[NodeIdentity]) {
        for trustee in trustees {
            self.spawn_one_supervisor(
                "connect-to-trustee",
                supervisor::RELAY_TO_TRUSTEE_INTERVAL,
                trustee.clone(),
                |state, to| async move { state.send_hello(&to).await },
            )
            .await;
        }
    }

    /// Start this node's own reconnection supervisor toward the relay,
    /// re-announcing via `ConnectionRequest` every 5s while no protocol
    /// instance is running.
    pub async fn spawn_connect_to_relay_supervisor(&self, relay_identity: NodeIdentity) {
        self.spawn_one_supervisor(
            "connect-to-relay",
            supervisor::PEER_TO_RELAY_INTERVAL,
            relay_identity,
            |state, to| async move { state.send_connection_request(&to).await },
        )
        .await;
    }

    async fn spawn_one_supervisor<F, Fut>(
        &self,
        label: &'static str,
        interval: std::time::Duration,
        peer: NodeIdentity,
        send: F,
    ) where
        F: Fn(ServiceState, NodeIdentity) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.0.supervisor_cancels.lock().await.push(cancel_tx);

        let state = self.clone();
        let send = Arc::new(send);
        tokio::spawn(async move {
            let is_running_state = state.clone();
            supervisor::run_supervisor(
                label,
                interval,
                {
                    let state = state.clone();
                    let send = send.clone();
                    let peer = peer.clone();
                    move || {
                        let state = state.clone();
                        let send = send.clone();
                        let peer = peer.clone();
                        async move {
                            if let Err(e) = send(state, peer).await {
                                warn!(error = %e, "reconnection supervisor send failed");
                            }
                        }
                    }
                },
                move || is_running_state.is_current_instance_running(),
                cancel_rx,
            )
            .await;
        });
    }

    fn is_current_instance_running(&self) -> bool {
        match &self.0.relay_lifecycle {
            Some(lifecycle) => lifecycle.is_running_sync(),
            None => self
                .0
                .current_instance
                .try_lock()
                .map(|guard| guard.as_ref().map(|i| !i.has_stopped()).unwrap_or(false))
                .unwrap_or(false),
        }
    }

    async fn cancel_all_supervisors(&self) {
        let cancels = self.0.supervisor_cancels.lock().await;
        for tx in cancels.iter() {
            let _ = tx.send(true);
        }
    }

    async fn send_connection_request(&self, to: &NodeIdentity) -> Result<()> {
        let msg = ConnectionRequest {
            protocol_version: self.0.parameters.protocol_version.clone(),
        };
        let envelope = ProtocolMessage::from_typed(&msg)?;
        self.0.overlay.send(to, envelope).await?;
        Ok(())
    }

    async fn send_hello(&self, to: &NodeIdentity) -> Result<()> {
        let envelope = ProtocolMessage::from_typed(&HelloMsg)?;
        self.0.overlay.send(to, envelope).await?;
        Ok(())
    }
}
