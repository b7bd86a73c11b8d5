//! The relay-side membership/churn controller.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sda_types::{IdentityMap, IdentityMapEntry, NodeIdentity, Role, Roster, WaitingEntry};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::waiting::WaitingSet;
use crate::{ChurnError, Result};

/// The protocol instance as seen by the churn controller: start, stop, and
/// a liveness check. Implemented by `sda-protocol`'s instance wrapper in the
/// running system and by an in-memory recorder in tests.
#[async_trait]
pub trait ProtocolLifecycle: Send + Sync {
    async fn start(&self);
    async fn stop(&self);
    async fn is_running(&self) -> bool;
}

struct ChurnState {
    waiting_clients: WaitingSet,
    waiting_trustees: WaitingSet,
    next_free_client_id: u32,
    next_free_trustee_id: u32,
}

impl ChurnState {
    fn new() -> Self {
        Self {
            waiting_clients: WaitingSet::new(),
            waiting_trustees: WaitingSet::new(),
            next_free_client_id: 0,
            next_free_trustee_id: 0,
        }
    }
}

/// Tracks which clients and trustees are currently connected to the relay,
/// assigns dense per-epoch numeric IDs, and decides when to (re)start or
/// stop the protocol instance.
///
/// All mutation and all consistent reads go through a single
/// [`tokio::sync::Mutex`], so a roster snapshot always reflects the same
/// state that just triggered a start/stop decision.
pub struct ChurnController {
    relay_identity: NodeIdentity,
    trustee_keys: HashSet<String>,
    lifecycle: Arc<dyn ProtocolLifecycle>,
    state: Mutex<ChurnState>,
}

impl ChurnController {
    /// # Errors
    ///
    /// Returns [`ChurnError::RelayIsTrustee`] if `relay_identity` also
    /// appears in `trustee_identities` (a misconfigured group file).
    pub fn new(
        relay_identity: NodeIdentity,
        trustee_identities: Vec<NodeIdentity>,
        lifecycle: Arc<dyn ProtocolLifecycle>,
    ) -> Result<Self> {
        let trustee_keys: HashSet<String> = trustee_identities
            .iter()
            .map(NodeIdentity::key_string)
            .collect();
        if trustee_keys.contains(&relay_identity.key_string()) {
            return Err(ChurnError::RelayIsTrustee);
        }
        Ok(Self {
            relay_identity,
            trustee_keys,
            lifecycle,
            state: Mutex::new(ChurnState::new()),
        })
    }

    pub fn is_trustee(&self, identity: &NodeIdentity) -> bool {
        self.trustee_keys.contains(&identity.key_string())
    }

    /// Record a connection from `from`, classifying it as trustee (if it
    /// appears in the configured trustee set) or client otherwise.
    /// Reconnecting an already-waiting peer is a no-op.
    pub async fn handle_connection(&self, from: &NodeIdentity) {
        let mut state = self.state.lock().await;
        let key = from.key_string();
        let is_trustee = self.is_trustee(from);

        if is_trustee {
            if state.waiting_trustees.contains(&key) {
                debug!(peer = %from, "trustee already waiting, ignoring reconnection");
                return;
            }
            let numeric_id = state.next_free_trustee_id;
            state.waiting_trustees.insert(
                key,
                WaitingEntry {
                    identity: from.clone(),
                    role: Role::Trustee,
                    numeric_id,
                },
            );
            state.next_free_trustee_id += 1;
            info!(peer = %from, numeric_id, "trustee connected");
        } else {
            if state.waiting_clients.contains(&key) {
                debug!(peer = %from, "client already waiting, ignoring reconnection");
                return;
            }
            let numeric_id = state.next_free_client_id;
            state.waiting_clients.insert(
                key,
                WaitingEntry {
                    identity: from.clone(),
                    role: Role::Client,
                    numeric_id,
                },
            );
            state.next_free_client_id += 1;
            info!(peer = %from, numeric_id, "client connected");
        }

        self.try_start_protocol_locked(&mut state).await;
    }

    /// A disconnection from a peer known to be waiting. Any disconnection,
    /// regardless of role, invalidates the whole epoch (see
    /// [`Self::handle_unknown_disconnection`]) rather than just removing the
    /// departing entry, trading churn responsiveness for dense IDs.
    pub async fn handle_disconnection(&self, from: &NodeIdentity) {
        let mut state = self.state.lock().await;
        let key = from.key_string();
        let is_trustee = self.is_trustee(from);
        let present = if is_trustee {
            state.waiting_trustees.contains(&key)
        } else {
            state.waiting_clients.contains(&key)
        };
        if !present {
            debug!(peer = %from, "disconnection from a peer not in the waiting set, ignoring");
            return;
        }
        info!(peer = %from, "disconnection, resetting the waiting set");
        self.reset_locked(&mut state).await;
    }

    /// An overlay-reported network error with no specific peer attached, or
    /// a round timeout: reset unconditionally.
    pub async fn handle_unknown_disconnection(&self) {
        let mut state = self.state.lock().await;
        info!("unattributed disconnection or timeout, resetting the waiting set");
        self.reset_locked(&mut state).await;
    }

    async fn reset_locked(&self, state: &mut ChurnState) {
        state.waiting_clients.clear();
        state.waiting_trustees.clear();
        state.next_free_client_id = 0;
        state.next_free_trustee_id = 0;
        self.lifecycle.stop().await;
        self.try_start_protocol_locked(state).await;
    }

    async fn try_start_protocol_locked(&self, state: &mut ChurnState) {
        let n_clients = state.waiting_clients.len();
        let n_trustees = state.waiting_trustees.len();
        if n_clients >= 1 && n_trustees >= 1 {
            if self.lifecycle.is_running().await {
                self.lifecycle.stop().await;
            }
            self.lifecycle.start().await;
        } else {
            debug!(n_clients, n_trustees, "too few participants, waiting");
        }
    }

    /// `(waiting clients, waiting trustees)`.
    pub async fn count(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.waiting_clients.len(), state.waiting_trustees.len())
    }

    /// Relay, then waiting clients, then waiting trustees, all in
    /// insertion order.
    pub async fn create_roster(&self) -> Roster {
        let state = self.state.lock().await;
        Roster::build(
            self.relay_identity.clone(),
            state.waiting_clients.entries(),
            state.waiting_trustees.entries(),
        )
    }

    pub async fn create_identities_map(&self) -> IdentityMap {
        let state = self.state.lock().await;
        let mut map = IdentityMap::new();
        map.insert(
            self.relay_identity.key_string(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: self.relay_identity.clone(),
            },
        );
        for entry in state.waiting_clients.entries() {
            map.insert(
                entry.identity.key_string(),
                IdentityMapEntry {
                    role: Role::Client,
                    numeric_id: entry.numeric_id,
                    transport_identity: entry.identity.clone(),
                },
            );
        }
        for entry in state.waiting_trustees.entries() {
            map.insert(
                entry.identity.key_string(),
                IdentityMapEntry {
                    role: Role::Trustee,
                    numeric_id: entry.numeric_id,
                    transport_identity: entry.identity.clone(),
                },
            );
        }
        map
    }
}
