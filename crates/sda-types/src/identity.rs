//! Node identity and role.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Result, TypesError};

/// A long-lived public verification key plus a transport address.
///
/// Equality and hashing are by public key only; the address is metadata
/// that may change across reconnects without changing the node's identity.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeIdentity {
    #[serde_as(as = "serde_with::Bytes")]
    public_key: [u8; 32],
    address: SocketAddr,
}

impl NodeIdentity {
    /// Build an identity from raw public-key bytes and a transport address.
    pub fn new(public_key: [u8; 32], address: SocketAddr) -> Self {
        Self {
            public_key,
            address,
        }
    }

    /// Build an identity from a hex-encoded public key and address string.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidPublicKeyLength`] if the decoded key is
    /// not 32 bytes, or [`TypesError::InvalidAddress`] if `address` does not
    /// parse as a `host:port` socket address.
    pub fn from_hex(public_key_hex: &str, address: &str) -> Result<Self> {
        let bytes =
            hex::decode(public_key_hex).map_err(|_| TypesError::InvalidPublicKeyLength(0))?;
        let public_key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypesError::InvalidPublicKeyLength(bytes.len()))?;
        let address = address
            .parse()
            .map_err(|e| TypesError::InvalidAddress(address.to_string(), e))?;
        Ok(Self::new(public_key, address))
    }

    /// The raw public-key bytes.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// The node's current transport address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// The stable string form of the public key, used as the map key
    /// throughout the churn controller and identity map.
    pub fn key_string(&self) -> String {
        hex::encode(self.public_key)
    }
}

impl PartialEq for NodeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for NodeIdentity {}

impl std::hash::Hash for NodeIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", &self.key_string()[..8.min(self.key_string().len())], self.address)
    }
}

/// The role a node plays for the lifetime of its process.
///
/// The relay is also called "Client0" in the newer terminology; both names
/// refer to the same `Relay` variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Relay,
    Client,
    Trustee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Relay => "relay",
            Role::Client => "client",
            Role::Trustee => "trustee",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn equality_is_by_key_only() {
        let a = NodeIdentity::new([1; 32], addr(1000));
        let b = NodeIdentity::new([1; 32], addr(2000));
        assert_eq!(a, b);
    }

    #[test]
    fn inequality_by_different_keys() {
        let a = NodeIdentity::new([1; 32], addr(1000));
        let b = NodeIdentity::new([2; 32], addr(1000));
        assert_ne!(a, b);
    }

    #[test]
    fn from_hex_roundtrip() {
        let hex_key = hex::encode([7u8; 32]);
        let identity = NodeIdentity::from_hex(&hex_key, "127.0.0.1:6879").unwrap();
        assert_eq!(identity.public_key(), &[7u8; 32]);
        assert_eq!(identity.address().port(), 6879);
    }

    #[test]
    fn from_hex_rejects_bad_length() {
        let err = NodeIdentity::from_hex("aabb", "127.0.0.1:6879").unwrap_err();
        assert!(matches!(err, TypesError::InvalidPublicKeyLength(_)));
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Relay.to_string(), "relay");
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Trustee.to_string(), "trustee");
    }
}
