//! The fast TCP side-channel: a direct connection between the relay and one
//! latency-sensitive client, used as an optional optimization over the
//! regular overlay unicast path.
//!
//! The server accepts exactly one connection for the lifetime of the
//! listener; subsequent connection attempts are left unaccepted.

use std::net::SocketAddr;

use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::framing::{read_framed, write_framed};
use crate::Result;

/// The fast channel listens on `relay_port + 3`.
pub fn fast_channel_port(relay_port: u16) -> u16 {
    relay_port + 3
}

/// A bound listener waiting for the single fast-channel connection.
pub struct FastChannelListener {
    listener: TcpListener,
}

impl FastChannelListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept the one connection this listener will ever accept.
    pub async fn accept_once(self) -> Result<FastChannelConnection> {
        let (stream, _peer) = self.listener.accept().await?;
        Ok(FastChannelConnection::from_stream(stream))
    }
}

/// An established fast-channel connection, readable and writable
/// concurrently.
pub struct FastChannelConnection {
    read_half: Mutex<BufReader<OwnedReadHalf>>,
    write_half: Mutex<BufWriter<OwnedWriteHalf>>,
}

impl FastChannelConnection {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            read_half: Mutex::new(BufReader::new(read_half)),
            write_half: Mutex::new(BufWriter::new(write_half)),
        }
    }

    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.write_half.lock().await;
        write_framed(&mut *writer, payload).await
    }

    pub async fn recv(&self) -> Result<Vec<u8>> {
        let mut reader = self.read_half.lock().await;
        read_framed(&mut *reader).await
    }
}
