//! Best-effort one-to-many delivery of downstream cells, shared by all
//! clients: real UDP multicast, and an in-process test double with a
//! configurable loss rate.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::framing::{frame, unframe, MAX_UDP_SIZE};
use crate::{Result, TransportError};

/// The multicast group the broadcast channel sends to and listens on.
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// The UDP port used by the broadcast channel.
pub const MULTICAST_PORT: u16 = 10101;

/// A best-effort one-to-many broadcast channel.
///
/// No retransmission, no ordering, no duplicate suppression: message loss
/// is a normal event the anonymity library's round-resend logic must
/// tolerate.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Send `payload` to every subscriber. Failures are logged and not
    /// retried by the channel itself.
    async fn broadcast(&self, payload: &[u8]) -> Result<()>;

    /// Block until the next message arrives.
    async fn recv(&self) -> Result<Vec<u8>>;
}

/// Subscribe to `channel` and invoke `on_message` for every delivered
/// payload until `cancel` carries `stop_on`. The overlay's per-client
/// subscription (`MessageSender::client_subscribe_to_broadcast`) calls this
/// with the opposite polarity (`true` = keep listening) from this module's
/// own test, hence the parameter rather than a hardcoded `true`.
///
/// Also returns once `cancel.changed()` fails, which happens when the last
/// `watch::Sender` is dropped: a dropped sender can never signal `stop_on`
/// again, so waiting on it further would spin this arm forever under
/// `biased` selection instead of falling through to `channel.recv()`.
pub async fn subscribe_and_loop<C, F>(
    channel: &C,
    mut on_message: F,
    mut cancel: watch::Receiver<bool>,
    stop_on: bool,
) where
    C: BroadcastChannel + ?Sized,
    F: FnMut(Vec<u8>),
{
    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() == stop_on {
                    debug!("broadcast subscription cancelled");
                    return;
                }
            }
            result = channel.recv() => {
                match result {
                    Ok(payload) => on_message(payload),
                    Err(e) => warn!(error = %e, "broadcast recv failed"),
                }
            }
        }
    }
}

/// Real UDP multicast implementation. Sockets are bound lazily on first use
/// and never closed for the lifetime of the process; they are reused across
/// epochs.
pub struct RealUdpBroadcastChannel {
    send_socket: Mutex<Option<Arc<UdpSocket>>>,
    recv_socket: Mutex<Option<Arc<UdpSocket>>>,
    target: SocketAddr,
}

impl RealUdpBroadcastChannel {
    pub fn new() -> Self {
        Self {
            send_socket: Mutex::new(None),
            recv_socket: Mutex::new(None),
            target: SocketAddr::new(MULTICAST_ADDR.into(), MULTICAST_PORT),
        }
    }

    async fn send_handle(&self) -> Result<Arc<UdpSocket>> {
        let mut guard = self.send_socket.lock().await;
        if let Some(socket) = guard.as_ref() {
            return Ok(socket.clone());
        }
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(8)?;
        let socket = Arc::new(socket);
        *guard = Some(socket.clone());
        Ok(socket)
    }

    async fn recv_handle(&self) -> Result<Arc<UdpSocket>> {
        let mut guard = self.recv_socket.lock().await;
        if let Some(socket) = guard.as_ref() {
            return Ok(socket.clone());
        }
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, MULTICAST_PORT)).await?;
        socket.join_multicast_v4(MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED)?;
        let socket = Arc::new(socket);
        *guard = Some(socket.clone());
        Ok(socket)
    }
}

impl Default for RealUdpBroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastChannel for RealUdpBroadcastChannel {
    async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        let socket = self.send_handle().await?;
        let framed = frame(payload);
        socket.send_to(&framed, self.target).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let socket = self.recv_handle().await?;
        let mut buf = vec![0u8; MAX_UDP_SIZE];
        let (n, _) = socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        unframe(&buf).map(|p| p.to_vec()).map_err(|e| {
            TransportError::ProtocolViolation(format!("malformed broadcast datagram: {e}"))
        })
    }
}

/// In-process test double delivering messages in order through an
/// in-memory broadcast queue, with a configurable loss rate for exercising
/// the anonymity library's tolerance of dropped cells.
pub struct LoopbackBroadcastChannel {
    sender: tokio::sync::broadcast::Sender<Vec<u8>>,
    receiver: Mutex<tokio::sync::broadcast::Receiver<Vec<u8>>>,
    loss_percentage: u8,
}

impl LoopbackBroadcastChannel {
    /// `loss_percentage` is clamped to `[0, 100]` and applied independently
    /// to every `broadcast()` call.
    pub fn new(loss_percentage: u8) -> Self {
        let (sender, receiver) = tokio::sync::broadcast::channel(1024);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            loss_percentage: loss_percentage.min(100),
        }
    }

    /// Get another handle subscribed to the same in-memory bus, as a second
    /// client would.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Vec<u8>> {
        self.sender.subscribe()
    }
}

impl Default for LoopbackBroadcastChannel {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl BroadcastChannel for LoopbackBroadcastChannel {
    async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        if self.loss_percentage > 0 {
            let roll: u8 = rand::Rng::gen_range(&mut rand::thread_rng(), 0..100);
            if roll < self.loss_percentage {
                debug!("loopback broadcast channel simulated loss");
                return Ok(());
            }
        }
        let _ = self.sender.send(payload.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "loopback broadcast channel closed",
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_delivers_without_loss() {
        let channel = LoopbackBroadcastChannel::new(0);
        let mut other = channel.subscribe();
        channel.broadcast(b"hello").await.unwrap();
        let received = other.recv().await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn loopback_drops_everything_at_full_loss() {
        let channel = LoopbackBroadcastChannel::new(100);
        let mut other = channel.subscribe();
        channel.broadcast(b"dropped").await.unwrap();
        // Give the (non-existent) delivery a chance to arrive.
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), other.recv()).await;
        assert!(result.is_err(), "message should have been dropped");
    }

    #[tokio::test]
    async fn subscribe_and_loop_stops_on_cancel() {
        let channel = Arc::new(LoopbackBroadcastChannel::new(0));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        let channel_clone = channel.clone();
        let handle = tokio::spawn(async move {
            subscribe_and_loop(
                channel_clone.as_ref(),
                move |payload| {
                    let received = received_clone.clone();
                    tokio::spawn(async move {
                        received.lock().await.push(payload);
                    });
                },
                cancel_rx,
                true,
            )
            .await;
        });

        channel.broadcast(b"one").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("loop should stop promptly after cancellation")
            .unwrap();
    }
}
