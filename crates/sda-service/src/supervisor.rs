//! The reconnection supervisor: a long-running task that periodically
//! re-announces this node to its counterpart while no protocol is running,
//! cooperatively cancelled through a `watch<bool>` handle.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// client/trustee -> relay re-announcement interval.
pub const PEER_TO_RELAY_INTERVAL: Duration = Duration::from_secs(5);

/// relay -> trustee re-announcement interval.
pub const RELAY_TO_TRUSTEE_INTERVAL: Duration = Duration::from_secs(30);

/// Run one supervisor: send immediately, then on every tick re-send only if
/// `is_running` currently reports `false`. `cancel` carrying `true` stops
/// the loop at the next suspension point (between the sleep and the next
/// send, or immediately if it fires mid-sleep).
pub async fn run_supervisor<S, SFut, R>(
    label: &'static str,
    interval: Duration,
    mut send: S,
    is_running: R,
    mut cancel: watch::Receiver<bool>,
) where
    S: FnMut() -> SFut,
    SFut: Future<Output = ()>,
    R: Fn() -> bool,
{
    debug!(label, "reconnection supervisor starting");
    send().await;
    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    debug!(label, "reconnection supervisor cancelled");
                    return;
                }
            }
            _ = tokio::time::sleep(interval) => {
                if *cancel.borrow() {
                    debug!(label, "reconnection supervisor cancelled");
                    return;
                }
                if !is_running() {
                    send().await;
                }
            }
        }
    }
}
