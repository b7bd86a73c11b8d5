//! Out-of-band service control messages: connection bookkeeping between
//! peers and the relay, handled directly by [`crate::ServiceState`] rather
//! than forwarded into a protocol instance. Numbered from 900 upward, well
//! clear of `sda_protocol::MessageKind`'s 0-37 range, since these never
//! cross the dispatcher.

use serde::{Deserialize, Serialize};

use sda_transport::envelope::WireMessage;

/// relay -> trustee: announces the relay's presence. Sent because trustees
/// may sit behind a NAT/firewall that prevents them from initiating.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HelloMsg;

impl WireMessage for HelloMsg {
    fn msg_type(&self) -> u16 {
        900
    }
}

/// peer -> relay: request to join the roster, carrying the sender's
/// protocol version for the relay's compatibility check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub protocol_version: String,
}

impl WireMessage for ConnectionRequest {
    fn msg_type(&self) -> u16 {
        901
    }
}

/// peer -> relay: request to leave the roster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisconnectionRequest;

impl WireMessage for DisconnectionRequest {
    fn msg_type(&self) -> u16 {
        902
    }
}

/// relay -> all: stop the local protocol instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopProtocol;

impl WireMessage for StopProtocol {
    fn msg_type(&self) -> u16 {
        903
    }
}

/// relay -> clients: tear down the SOCKS subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopSocks;

impl WireMessage for StopSocks {
    fn msg_type(&self) -> u16 {
        904
    }
}
