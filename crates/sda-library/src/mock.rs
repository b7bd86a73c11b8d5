//! A deterministic mock of the anonymity library, sufficient to exercise
//! the dispatcher and protocol-instance state machine without implementing
//! real DC-net cryptography.

use std::sync::{Arc, Mutex};

use sda_types::{IdentityMap, ProtocolParameters, Role};

use crate::{
    AnonymityLibrary, AnonymityLibraryFactory, LibraryConfig, LibraryMessage, LibraryOutbound,
    Result, TimeoutHandler,
};

/// Records every message delivered to it and every shutdown call, so tests
/// can assert on dispatcher behavior.
pub struct MockLibrary {
    role: Role,
    received: Arc<Mutex<Vec<LibraryMessage>>>,
    shutdown_count: Arc<Mutex<u32>>,
    timeout_handler: Option<TimeoutHandler>,
}

impl MockLibrary {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn received_messages(&self) -> Vec<LibraryMessage> {
        self.received.lock().expect("mock lock poisoned").clone()
    }

    pub fn shutdown_count(&self) -> u32 {
        *self.shutdown_count.lock().expect("mock lock poisoned")
    }

    /// Simulate the library detecting delinquent participants for the
    /// current round, invoking the installed timeout handler if any.
    pub fn trigger_timeout(&self, late_clients: &[u32], late_trustees: &[u32]) {
        if let Some(handler) = &self.timeout_handler {
            handler(late_clients, late_trustees);
        }
    }
}

impl AnonymityLibrary for MockLibrary {
    fn received(&mut self, msg: LibraryMessage) -> Result<Vec<LibraryOutbound>> {
        self.received.lock().expect("mock lock poisoned").push(msg);
        Ok(Vec::new())
    }

    fn shutdown(&mut self) {
        *self.shutdown_count.lock().expect("mock lock poisoned") += 1;
    }
}

/// Builds [`MockLibrary`] instances, recording the parameters and identity
/// map each instance was constructed with for test assertions.
#[derive(Default)]
pub struct MockLibraryFactory;

impl AnonymityLibraryFactory for MockLibraryFactory {
    fn new_instance(&self, role: Role, config: LibraryConfig) -> Box<dyn AnonymityLibrary> {
        let _ = config.identities; // erased at this boundary; real factories would bind it
        let _: ProtocolParameters = config.parameters;
        Box::new(MockLibrary {
            role,
            received: Arc::new(Mutex::new(Vec::new())),
            shutdown_count: Arc::new(Mutex::new(0)),
            timeout_handler: config.timeout_handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sda_types::IdentityMap;

    fn config() -> LibraryConfig {
        LibraryConfig {
            identities: IdentityMap::new(),
            parameters: ProtocolParameters::default(),
            timeout_handler: None,
        }
    }

    #[test]
    fn received_messages_are_recorded() {
        let factory = MockLibraryFactory;
        let mut library = factory.new_instance(Role::Relay, config());
        library
            .received(LibraryMessage {
                msg_type: 1,
                payload: vec![1, 2, 3],
            })
            .unwrap();
        library.shutdown();
    }

    #[test]
    fn timeout_handler_fires() {
        let called: Arc<Mutex<Option<(Vec<u32>, Vec<u32>)>>> = Arc::new(Mutex::new(None));
        let called_clone = called.clone();
        let mock = MockLibrary {
            role: Role::Relay,
            received: Arc::new(Mutex::new(Vec::new())),
            shutdown_count: Arc::new(Mutex::new(0)),
            timeout_handler: Some(Box::new(move |clients, trustees| {
                *called_clone.lock().unwrap() = Some((clients.to_vec(), trustees.to_vec()));
            })),
        };
        mock.trigger_timeout(&[1, 2], &[0]);
        assert_eq!(*called.lock().unwrap(), Some((vec![1, 2], vec![0])));
    }
}
