//! Churn scenarios across the relay/trustee/client address ranges used in
//! the upstream test suite this controller was ported from: the relay sits
//! on `127.0.0.0`, trustees on `0.127.0.0`, and clients on `0.0.127.0`, each
//! distinguished only by port. Exercises [`sda_churn::ChurnController`]
//! end to end against a recording lifecycle, the way a relay node would
//! drive it from live connection/disconnection events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sda_churn::{ChurnController, ProtocolLifecycle};
use sda_types::NodeIdentity;

fn relay_identity() -> NodeIdentity {
    identity_at(0, "127.0.0.0:1")
}

fn trustee_identity(n: u8) -> NodeIdentity {
    identity_at(10 + n, &format!("0.127.0.0:{n}"))
}

fn client_identity(n: u8) -> NodeIdentity {
    identity_at(20 + n, &format!("0.0.127.0:{n}"))
}

fn identity_at(key: u8, addr: &str) -> NodeIdentity {
    let addr: SocketAddr = addr.parse().unwrap();
    NodeIdentity::new([key; 32], addr)
}

#[derive(Default)]
struct RecordingLifecycle {
    starts: AtomicU32,
    stops: AtomicU32,
    running: AtomicBool,
}

impl RecordingLifecycle {
    fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
    fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolLifecycle for RecordingLifecycle {
    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }
    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn controller(trustee_count: u8) -> (ChurnController, Arc<RecordingLifecycle>) {
    let trustees = (0..trustee_count).map(trustee_identity).collect();
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let c = ChurnController::new(relay_identity(), trustees, lifecycle.clone()).unwrap();
    (c, lifecycle)
}

#[tokio::test]
async fn s1_empty_roster_never_starts() {
    let (c, lifecycle) = controller(3);
    assert_eq!(c.count().await, (0, 0));
    assert_eq!(c.create_roster().await.len(), 1);
    assert_eq!(lifecycle.starts(), 0);
}

#[tokio::test]
async fn s2_through_s3_trustee_connect_is_idempotent() {
    let (c, lifecycle) = controller(3);
    let t0 = trustee_identity(0);

    c.handle_connection(&t0).await;
    assert_eq!(c.count().await, (0, 1));
    assert_eq!(lifecycle.starts(), 0);

    // reconnecting the same trustee must not bump the waiting set or
    // trigger a start
    c.handle_connection(&t0).await;
    assert_eq!(c.count().await, (0, 1));
    assert_eq!(lifecycle.starts(), 0);
}

#[tokio::test]
async fn s4_first_client_with_a_trustee_starts_once() {
    let (c, lifecycle) = controller(3);
    c.handle_connection(&trustee_identity(0)).await;
    c.handle_connection(&client_identity(0)).await;

    assert_eq!(c.count().await, (1, 1));
    assert_eq!(c.create_roster().await.len(), 3);
    assert_eq!(lifecycle.starts(), 1);
    assert_eq!(lifecycle.stops(), 0);
}

#[tokio::test]
async fn s5_second_client_restarts_the_protocol() {
    let (c, lifecycle) = controller(3);
    c.handle_connection(&trustee_identity(0)).await;
    c.handle_connection(&client_identity(0)).await;
    c.handle_connection(&client_identity(1)).await;

    assert_eq!(c.count().await, (2, 1));
    assert_eq!(lifecycle.starts(), 2);
    assert_eq!(lifecycle.stops(), 1);
}

#[tokio::test]
async fn s6_a_single_disconnection_clears_the_whole_epoch() {
    let (c, lifecycle) = controller(3);
    c.handle_connection(&trustee_identity(0)).await;
    c.handle_connection(&client_identity(0)).await;
    c.handle_connection(&client_identity(1)).await;

    c.handle_disconnection(&client_identity(1)).await;
    assert_eq!(c.count().await, (0, 0));
    assert_eq!(c.create_roster().await.len(), 1);
    assert_eq!(lifecycle.stops(), 2);
}

#[tokio::test]
async fn s7_unknown_disconnection_resets_and_ids_restart_at_zero() {
    let (c, lifecycle) = controller(3);
    c.handle_connection(&trustee_identity(0)).await;
    c.handle_connection(&trustee_identity(1)).await;
    c.handle_connection(&client_identity(0)).await;
    c.handle_connection(&client_identity(1)).await;
    assert_eq!(c.count().await, (2, 2));
    let stops_before = lifecycle.stops();

    c.handle_unknown_disconnection().await;
    assert_eq!(c.count().await, (0, 0));
    assert_eq!(lifecycle.stops(), stops_before + 1);

    c.handle_connection(&trustee_identity(2)).await;
    let map = c.create_identities_map().await;
    let entry = map.get(&trustee_identity(2).key_string()).unwrap();
    assert_eq!(entry.numeric_id, 0);
}

#[tokio::test]
async fn relay_listed_as_its_own_trustee_is_rejected() {
    let relay = relay_identity();
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let err = ChurnController::new(relay.clone(), vec![relay], lifecycle).unwrap_err();
    assert!(matches!(err, sda_churn::ChurnError::RelayIsTrustee));
}

#[tokio::test]
async fn a_bulk_reconnect_after_reset_restarts_once_quorum_is_met() {
    let (c, lifecycle) = controller(3);
    c.handle_connection(&client_identity(0)).await;
    c.handle_connection(&client_identity(1)).await;
    c.handle_connection(&client_identity(2)).await;
    c.handle_connection(&trustee_identity(1)).await;

    assert_eq!(c.count().await, (3, 1));
    assert_eq!(lifecycle.starts(), 1);
    assert_eq!(c.create_roster().await.len(), 5);
}
