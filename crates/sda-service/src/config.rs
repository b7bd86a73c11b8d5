//! Loading and saving the three TOML config file kinds (identity, group,
//! protocol) plus the CBOR-persisted identity/role pair a node keeps
//! between runs.

use std::path::Path;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::info;

use sda_types::{NodeIdentity, Role};

/// Errors raised while loading or saving on-disk configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path:?}: {source}")]
    TomlParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Types(#[from] sda_types::TypesError),

    #[error(transparent)]
    Transport(#[from] sda_transport::TransportError),

    #[error("group file has no entry described as \"relay\"")]
    MissingRelay,

    #[error("group file has no entries described as \"trustee\"")]
    NoTrustees,
}

type Result<T> = std::result::Result<T, ConfigError>;

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The hex-keyed identity file produced by `gen-id` and consumed by every
/// subcommand to learn this node's own keypair and bind address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityFile {
    pub public: String,
    pub private: String,
    pub address: String,
}

impl IdentityFile {
    /// Generate a fresh Ed25519 keypair bound to `address`.
    pub fn generate(address: String) -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let public = hex::encode(signing_key.verifying_key().to_bytes());
        let private = hex::encode(signing_key.to_bytes());
        Self {
            public,
            private,
            address,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "wrote identity file");
        Ok(())
    }

    /// This node's transport identity, combining the public key with the
    /// configured bind address.
    pub fn node_identity(&self) -> Result<NodeIdentity> {
        Ok(NodeIdentity::from_hex(&self.public, &self.address)?)
    }
}

/// One roster entry in a group file: a peer's public key, bind address, and
/// a free-text role description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupEntry {
    pub public: String,
    pub address: String,
    pub description: String,
}

/// The group file: every participant's identity, classified by the
/// `"relay"` / `"trustee"` description strings (any other description,
/// such as `"client"`, is informational only - clients are not listed
/// statically since they connect dynamically at runtime).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupFile {
    pub servers: Vec<GroupEntry>,
}

impl GroupFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Classify entries by description into `(relay, trustees)`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRelay`] if no entry is described as
    /// `"relay"`, or [`ConfigError::NoTrustees`] if none is described as
    /// `"trustee"`.
    pub fn relay_and_trustees(&self) -> Result<(NodeIdentity, Vec<NodeIdentity>)> {
        let mut relay = None;
        let mut trustees = Vec::new();
        for entry in &self.servers {
            let identity = NodeIdentity::from_hex(&entry.public, &entry.address)?;
            match entry.description.as_str() {
                "relay" => relay = Some(identity),
                "trustee" => trustees.push(identity),
                _ => {}
            }
        }
        let relay = relay.ok_or(ConfigError::MissingRelay)?;
        if trustees.is_empty() {
            return Err(ConfigError::NoTrustees);
        }
        Ok((relay, trustees))
    }
}

/// What a node persists to `identity.bin` between runs: its own identity
/// plus the role it was last started with. Opaque to every other layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedIdentity {
    pub identity: NodeIdentity,
    pub role: Role,
}

impl PersistedIdentity {
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = sda_transport::cbor::to_vec(self)?;
        std::fs::write(path, bytes).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Load a previously persisted identity. Returns `Ok(None)` rather than
    /// an error when the file does not exist yet, matching the tolerant
    /// first-run behavior of the rest of the loaders in this module.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(sda_transport::cbor::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Load the protocol parameters file, falling back to
/// [`sda_types::ProtocolParameters::default`] when `path` does not exist.
pub fn load_protocol_parameters(path: &Path) -> Result<sda_types::ProtocolParameters> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no protocol config found, using defaults");
            Ok(sda_types::ProtocolParameters::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
