//! `client`: start this node as a client, connecting to the configured
//! relay.

use std::sync::Arc;

use tracing::info;

use sda_library::AnonymityLibraryFactory;
use sda_overlay::{InMemoryOverlayTree, OverlayTree, TreeNode};
use sda_transport::broadcast::{BroadcastChannel, RealUdpBroadcastChannel};
use sda_types::Role;

use crate::commands::NodePaths;
use crate::config::PersistedIdentity;
use crate::{Result, ServiceState};

/// # Errors
///
/// Returns an error if the config files cannot be loaded or the group file
/// has no relay entry.
pub async fn run(paths: &NodePaths, factory: Arc<dyn AnonymityLibraryFactory>) -> Result<()> {
    let (local_identity, group, parameters) = super::load_identity_and_params(paths)?;
    let (relay_identity, _trustees) = group.relay_and_trustees()?;

    let broadcast: Option<Arc<dyn BroadcastChannel>> = parameters
        .use_udp
        .then(|| Arc::new(RealUdpBroadcastChannel::new()) as Arc<dyn BroadcastChannel>);

    let overlay: Arc<dyn OverlayTree> = Arc::new(InMemoryOverlayTree::new(vec![TreeNode {
        identity: relay_identity.clone(),
    }]));

    let state = ServiceState::new_client(
        local_identity.clone(),
        relay_identity.clone(),
        overlay,
        broadcast,
        factory,
        parameters,
    );

    PersistedIdentity {
        identity: local_identity,
        role: Role::Client,
    }
    .save(&paths.persisted_identity)?;

    state
        .spawn_connect_to_relay_supervisor(relay_identity)
        .await;
    info!("client running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.ok();
    Ok(())
}
