//! One module per CLI subcommand.

pub mod client;
pub mod gen_id;
pub mod relay;
pub mod trustee;

use crate::config::{self, GroupFile, IdentityFile};
use crate::Result;
use sda_types::{NodeIdentity, ProtocolParameters};

/// Paths to the three config files plus the identity/persisted-state path,
/// shared by every role subcommand.
pub struct NodePaths {
    pub identity: std::path::PathBuf,
    pub group: std::path::PathBuf,
    pub protocol: std::path::PathBuf,
    pub persisted_identity: std::path::PathBuf,
}

/// Load this node's identity file, its group roster, and the protocol
/// parameters file (falling back to defaults if absent) - the bootstrap
/// every role subcommand needs before it can build a [`crate::ServiceState`].
pub fn load_identity_and_params(
    paths: &NodePaths,
) -> Result<(NodeIdentity, GroupFile, ProtocolParameters)> {
    let identity_file = IdentityFile::load(&paths.identity)?;
    let local_identity = identity_file.node_identity()?;
    let group = GroupFile::load(&paths.group)?;
    let parameters = config::load_protocol_parameters(&paths.protocol)?;
    Ok((local_identity, group, parameters))
}
