//! An order-preserving waiting set: a client or trustee queue where
//! insertion order is part of the observable contract (the roster is built
//! by walking waiting entries in the order they connected).

use std::collections::HashMap;

use sda_types::WaitingEntry;

/// `entries` holds insertion order; `index` maps a peer's key string to its
/// position in `entries` for O(1) membership checks.
#[derive(Debug, Default)]
pub struct WaitingSet {
    entries: Vec<WaitingEntry>,
    index: HashMap<String, usize>,
}

impl WaitingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a new entry. Callers must check `contains` first; inserting an
    /// already-present key would desynchronize `index`.
    pub fn insert(&mut self, key: String, entry: WaitingEntry) {
        debug_assert!(!self.index.contains_key(&key));
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WaitingEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sda_types::{NodeIdentity, Role};
    use std::net::SocketAddr;

    fn identity(key: u8, port: u16) -> NodeIdentity {
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        NodeIdentity::new([key; 32], addr)
    }

    #[test]
    fn preserves_insertion_order() {
        let mut set = WaitingSet::new();
        let a = identity(1, 1000);
        let b = identity(2, 1001);
        set.insert(
            a.key_string(),
            WaitingEntry {
                identity: a.clone(),
                role: Role::Client,
                numeric_id: 0,
            },
        );
        set.insert(
            b.key_string(),
            WaitingEntry {
                identity: b.clone(),
                role: Role::Client,
                numeric_id: 1,
            },
        );
        assert_eq!(set.entries()[0].identity, a);
        assert_eq!(set.entries()[1].identity, b);
        assert!(set.contains(&a.key_string()));
        assert!(!set.contains(&identity(3, 1002).key_string()));
    }

    #[test]
    fn clear_empties_both_entries_and_index() {
        let mut set = WaitingSet::new();
        let a = identity(1, 1000);
        set.insert(
            a.key_string(),
            WaitingEntry {
                identity: a.clone(),
                role: Role::Client,
                numeric_id: 0,
            },
        );
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(&a.key_string()));
    }
}
