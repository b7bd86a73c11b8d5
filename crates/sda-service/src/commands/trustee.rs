//! `trustee`: start this node as a trustee. Unlike a client, a trustee does
//! not begin announcing itself immediately - it waits for the relay's
//! `HelloMsg` (see [`ServiceState::handle_hello`]) before starting its own
//! relay-connection supervisor, since trustees may sit behind a NAT/firewall
//! that prevents them from initiating contact.

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

    let _state = ServiceState::new_trustee(
        local_identity.clone(),
        relay_identity,
        overlay,
        broadcast,
        factory,
        parameters,
    );

    PersistedIdentity {
        identity: local_identity,
        role: Role::Trustee,
    }
    .save(&paths.persisted_identity)?;

    info!("trustee running, waiting for the relay's hello, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.ok();
    Ok(())
}
