//! Per-epoch waiting entries, roster, and identity map.

use std::collections::HashMap;

use crate::identity::{NodeIdentity, Role};

/// A client or trustee waiting to join the next epoch, with its stable
/// numeric ID within the current epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingEntry {
    pub identity: NodeIdentity,
    pub role: Role,
    pub numeric_id: u32,
}

/// One entry of the per-epoch identity map: for a given peer's public key,
/// its role, numeric ID, and transport identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityMapEntry {
    pub role: Role,
    pub numeric_id: u32,
    pub transport_identity: NodeIdentity,
}

/// Mapping from the string form of a peer's public key to its identity-map
/// entry. Built per epoch; for non-relay participants it contains only the
/// relay entry.
#[derive(Clone, Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<String, IdentityMapEntry>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, entry: IdentityMapEntry) {
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: &str) -> Option<&IdentityMapEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries mapped to the relay role. Used to detect a corrupted
    /// identity map with more than one relay (see [`crate::TypesError`]
    /// callers in `sda-overlay`, which treats this as a fatal construction
    /// error per the duplicate-relay invariant).
    pub fn relay_entries(&self) -> impl Iterator<Item = (&String, &IdentityMapEntry)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.role == Role::Relay)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IdentityMapEntry)> {
        self.entries.iter()
    }
}

/// The ordered participant list rooted at the relay: position 0 is the
/// relay, positions `1..=C` are clients in insertion order, positions
/// `C+1..=C+T` are trustees in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    members: Vec<NodeIdentity>,
}

impl Roster {
    /// Build a roster from the relay identity plus ordered client and
    /// trustee waiting entries. `clients` and `trustees` MUST already be in
    /// insertion order (the order the churn controller recorded them).
    pub fn build(relay: NodeIdentity, clients: &[WaitingEntry], trustees: &[WaitingEntry]) -> Self {
        let mut members = Vec::with_capacity(1 + clients.len() + trustees.len());
        members.push(relay);
        members.extend(clients.iter().map(|e| e.identity.clone()));
        members.extend(trustees.iter().map(|e| e.identity.clone()));
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn relay(&self) -> Option<&NodeIdentity> {
        self.members.first()
    }

    pub fn members(&self) -> &[NodeIdentity] {
        &self.members
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.members.iter().any(|m| m == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn identity(key: u8, port: u16) -> NodeIdentity {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        NodeIdentity::new([key; 32], addr)
    }

    fn waiting(key: u8, port: u16, role: Role, id: u32) -> WaitingEntry {
        WaitingEntry {
            identity: identity(key, port),
            role,
            numeric_id: id,
        }
    }

    #[test]
    fn roster_orders_relay_then_clients_then_trustees() {
        let relay = identity(0, 1000);
        let clients = vec![waiting(1, 1001, Role::Client, 0), waiting(2, 1002, Role::Client, 1)];
        let trustees = vec![waiting(3, 1003, Role::Trustee, 0)];
        let roster = Roster::build(relay.clone(), &clients, &trustees);

        assert_eq!(roster.len(), 4);
        assert_eq!(roster.members()[0], relay);
        assert_eq!(roster.members()[1], clients[0].identity);
        assert_eq!(roster.members()[2], clients[1].identity);
        assert_eq!(roster.members()[3], trustees[0].identity);
    }

    #[test]
    fn identity_map_detects_duplicate_relay() {
        let mut map = IdentityMap::new();
        map.insert(
            "a".into(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: identity(0, 1000),
            },
        );
        map.insert(
            "b".into(),
            IdentityMapEntry {
                role: Role::Relay,
                numeric_id: 0,
                transport_identity: identity(1, 1001),
            },
        );
        assert_eq!(map.relay_entries().count(), 2);
    }
}
