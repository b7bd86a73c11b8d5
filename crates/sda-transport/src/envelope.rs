//! The `ProtocolMessage` wire envelope.
//!
//! Every message exchanged between relay/client/trustee nodes is wrapped in
//! this envelope before being handed to the overlay or framed onto the fast
//! channel / broadcast channel.

use serde::{Deserialize, Serialize};

use crate::{cbor, Result, TransportError};

/// Current SDA wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum payload size, matching the UDP broadcast datagram ceiling minus
/// envelope overhead.
pub const MAX_PAYLOAD_SIZE: usize = crate::framing::MAX_UDP_SIZE - 64;

/// Implemented by the closed set of typed protocol messages so the envelope
/// can tag them with a `msg_type` without this crate depending on the
/// message vocabulary itself (which lives in `sda-protocol`, keeping the
/// dependency direction one-way: protocol -> transport, not the reverse).
pub trait WireMessage: Serialize {
    fn msg_type(&self) -> u16;
}

/// The envelope wrapped around every typed protocol message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub version: u8,
    pub msg_type: u16,
    pub msg_id: [u8; 16],
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl ProtocolMessage {
    /// Wrap a typed message into a signed-and-timestamped envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the payload cannot be
    /// CBOR-encoded.
    pub fn from_typed<M: WireMessage>(msg: &M) -> Result<Self> {
        let payload = cbor::to_vec(msg)?;
        let mut msg_id = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut msg_id);
        let timestamp = now_unix_secs()?;
        Ok(Self {
            version: PROTOCOL_VERSION,
            msg_type: msg.msg_type(),
            msg_id,
            timestamp,
            payload,
        })
    }

    /// Build an envelope directly from a message-type code and an
    /// already-encoded payload, for callers that address the wire
    /// vocabulary by numeric code rather than through a concrete
    /// [`WireMessage`] type (the protocol dispatcher's closed message set).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolViolation`] if `payload` exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn new_raw(msg_type: u16, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::ProtocolViolation(format!(
                "payload too large: {} bytes, max {MAX_PAYLOAD_SIZE}",
                payload.len()
            )));
        }
        let mut msg_id = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut msg_id);
        Ok(Self {
            version: PROTOCOL_VERSION,
            msg_type,
            msg_id,
            timestamp: now_unix_secs()?,
            payload,
        })
    }

    /// Decode the payload as a concrete typed message.
    pub fn decode_payload<M: serde::de::DeserializeOwned>(&self) -> Result<M> {
        cbor::from_slice(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let msg: Self = cbor::from_slice(data)?;
        msg.validate()?;
        Ok(msg)
    }

    /// Validate the envelope's version and payload size.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolViolation`] if the version is
    /// unsupported or the payload is too large.
    pub fn validate(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(TransportError::ProtocolViolation(format!(
                "unsupported protocol version {}, expected {PROTOCOL_VERSION}",
                self.version
            )));
        }
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::ProtocolViolation(format!(
                "payload too large: {} bytes, max {MAX_PAYLOAD_SIZE}",
                self.payload.len()
            )));
        }
        Ok(())
    }
}

fn now_unix_secs() -> Result<u64> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TransportError::ProtocolViolation(format!("system clock error: {e}")))
}
