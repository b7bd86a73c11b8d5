//! End-to-end smoke test: a relay, one trustee, and one client share a
//! single in-memory overlay; connection requests driven through
//! [`sda_service::ServiceState`] bring up a real
//! [`sda_protocol::ProtocolInstance`] on the relay, which then routes a
//! message back out to the trustee over the overlay - exercising the
//! service/churn/protocol/overlay layers together rather than any one in
//! isolation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sda_library::{
    AnonymityLibrary, AnonymityLibraryFactory, LibraryConfig, LibraryMessage, LibraryOutbound,
    OutboundTarget,
};
use sda_overlay::{InMemoryOverlayTree, TreeNode};
use sda_protocol::MessageKind;
use sda_service::ServiceState;
use sda_types::{NodeIdentity, ProtocolParameters, Role};

fn identity(key: u8, addr: &str) -> NodeIdentity {
    let addr: SocketAddr = addr.parse().unwrap();
    NodeIdentity::new([key; 32], addr)
}

/// Replies to the relay's boot parameters with a message addressed to
/// trustee 0, so the test can observe it landing in the overlay's inbox.
struct ProbeLibrary {
    role: Role,
}

impl AnonymityLibrary for ProbeLibrary {
    fn received(&mut self, msg: LibraryMessage) -> sda_library::Result<Vec<LibraryOutbound>> {
        if self.role == Role::Relay && msg.msg_type == MessageKind::AllAllParameters.code() {
            return Ok(vec![LibraryOutbound {
                target: OutboundTarget::Trustee(0),
                msg_type: MessageKind::TruRelTellPk.code(),
                payload: vec![9, 9, 9],
            }]);
        }
        Ok(Vec::new())
    }

    fn shutdown(&mut self) {}
}

#[derive(Default)]
struct ProbeLibraryFactory {
    relay_instantiated: Arc<AtomicBool>,
}

impl AnonymityLibraryFactory for ProbeLibraryFactory {
    fn new_instance(&self, role: Role, _config: LibraryConfig) -> Box<dyn AnonymityLibrary> {
        if role == Role::Relay {
            self.relay_instantiated.store(true, Ordering::SeqCst);
        }
        Box::new(ProbeLibrary { role })
    }
}

#[tokio::test]
async fn relay_connection_quorum_starts_a_real_protocol_instance() {
    let relay_identity = identity(0, "127.0.0.1:9000");
    let trustee_identity = identity(1, "127.0.0.1:9001");
    let client_identity = identity(2, "127.0.0.1:9002");

    let overlay = Arc::new(InMemoryOverlayTree::new(vec![
        TreeNode {
            identity: relay_identity.clone(),
        },
        TreeNode {
            identity: trustee_identity.clone(),
        },
        TreeNode {
            identity: client_identity.clone(),
        },
    ]));

    let probe = Arc::new(ProbeLibraryFactory::default());
    let parameters = ProtocolParameters::default();

    let relay_state = ServiceState::new_relay(
        relay_identity.clone(),
        vec![trustee_identity.clone()],
        overlay.clone(),
        None,
        probe.clone(),
        parameters.clone(),
    )
    .unwrap();

    // Not yet enough participants: a lone trustee must not start anything.
    relay_state
        .handle_connection_request(&trustee_identity, &parameters.protocol_version)
        .await
        .unwrap();
    assert_eq!(relay_state.churn().unwrap().count().await, (0, 1));
    assert!(overlay.take_inbox(&trustee_identity).is_empty());

    // The client arriving completes quorum and should bring the relay's
    // protocol instance up, which in turn routes the probe library's
    // response to the trustee over the shared overlay.
    relay_state
        .handle_connection_request(&client_identity, &parameters.protocol_version)
        .await
        .unwrap();
    assert_eq!(relay_state.churn().unwrap().count().await, (1, 1));
    assert_eq!(relay_state.churn().unwrap().create_roster().await.len(), 3);

    let inbox = overlay.take_inbox(&trustee_identity);
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].msg_type, MessageKind::TruRelTellPk.code());
    assert_eq!(inbox[0].payload, vec![9, 9, 9]);
    assert!(probe.relay_instantiated.load(Ordering::SeqCst));

    // A protocol-version mismatch from a fresh peer is rejected outright.
    let stray = identity(3, "127.0.0.1:9003");
    let err = relay_state
        .handle_connection_request(&stray, "not-a-real-version")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        sda_service::ServiceError::ProtocolVersionMismatch { .. }
    ));
}

#[tokio::test]
async fn trustee_waits_for_hello_before_announcing_itself() {
    let relay_identity = identity(0, "127.0.0.1:9100");
    let trustee_identity = identity(1, "127.0.0.1:9101");
    let overlay = Arc::new(InMemoryOverlayTree::new(vec![TreeNode {
        identity: relay_identity.clone(),
    }]));

    let trustee_state = ServiceState::new_trustee(
        trustee_identity,
        relay_identity.clone(),
        overlay.clone(),
        None,
        Arc::new(sda_library::mock::MockLibraryFactory),
        ProtocolParameters::default(),
    );

    // Before any hello arrives, the trustee has not reached out on its own.
    assert!(overlay.take_inbox(&relay_identity).is_empty());

    trustee_state.handle_hello(&relay_identity).await.unwrap();
    // Give the spawned supervisor a chance to send its first announcement.
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let inbox = overlay.take_inbox(&relay_identity);
    assert_eq!(inbox.len(), 1);
}
