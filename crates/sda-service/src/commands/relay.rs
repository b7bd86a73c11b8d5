//! `relay`: start this node as the relay (a.k.a. Client0).

use std::sync::Arc;

use tracing::{info, warn};

use sda_library::AnonymityLibraryFactory;
use sda_overlay::{InMemoryOverlayTree, OverlayTree, TreeNode};
use sda_transport::broadcast::{BroadcastChannel, RealUdpBroadcastChannel};
use sda_types::Role;

use crate::commands::NodePaths;
use crate::config::PersistedIdentity;
use crate::{Result, ServiceState};

/// # Errors
///
/// Returns an error if the config files cannot be loaded, the group file
/// has no trustee entries, or construction of the churn controller fails
/// (e.g. the relay is also listed as a trustee).
pub async fn run(paths: &NodePaths, factory: Arc<dyn AnonymityLibraryFactory>) -> Result<()> {
    let (local_identity, group, parameters) = super::load_identity_and_params(paths)?;
    let (relay_identity, trustees) = group.relay_and_trustees()?;
    if relay_identity != local_identity {
        warn!("local identity file does not match the group file's relay entry");
    }

    let broadcast: Option<Arc<dyn BroadcastChannel>> = parameters
        .use_udp
        .then(|| Arc::new(RealUdpBroadcastChannel::new()) as Arc<dyn BroadcastChannel>);

    // No concrete peer-to-peer overlay/RPC substrate is implemented in this
    // workspace (it is an external collaborator); the in-memory tree seeded
    // with the known roster stands in for it so the rest of the service
    // actor can be exercised end to end.
    let mut nodes: Vec<TreeNode> = vec![TreeNode {
        identity: local_identity.clone(),
    }];
    nodes.extend(trustees.iter().map(|t| TreeNode {
        identity: t.clone(),
    }));
    let overlay: Arc<dyn OverlayTree> = Arc::new(InMemoryOverlayTree::new(nodes));

    let state = ServiceState::new_relay(
        local_identity.clone(),
        trustees.clone(),
        overlay,
        broadcast,
        factory,
        parameters,
    )?;

    PersistedIdentity {
        identity: local_identity,
        role: Role::Relay,
    }
    .save(&paths.persisted_identity)?;

    state.spawn_connect_to_trustees_supervisors(&trustees).await;
    info!("relay running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.ok();
    Ok(())
}
