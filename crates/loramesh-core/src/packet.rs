//! The in-memory mesh packet model.
//!
//! Packets arrive from and leave through the flooding substrate; the
//! reliable layer and the node directory only ever see this decoded
//! form. Wire encoding of full packets is the radio interface's concern;
//! the `Routing` control record carried inside ack/nak payloads is
//! encoded here with the node's binary serializer.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{GlobalPacketId, NodeNum, PacketId};

/// Transmit priority, highest first in the substrate's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Min,
    Background,
    #[default]
    Default,
    Reliable,
    Ack,
    Max,
}

impl Priority {
    /// The queue level used on the wire.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Priority::Min => 0,
            Priority::Background => 10,
            Priority::Default => 64,
            Priority::Reliable => 70,
            Priority::Ack => 120,
            Priority::Max => 127,
        }
    }
}

/// Application port a decoded payload is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortNum {
    #[default]
    Unknown,
    TextMessage,
    Position,
    NodeInfo,
    Routing,
    Admin,
}

/// Outcome carried in a routing control record.
///
/// `None` acknowledges delivery; anything else is a negative ack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingError {
    #[default]
    None,
    NoRoute,
    GotNak,
    Timeout,
    NoInterface,
    MaxRetransmit,
    NoChannel,
    TooLarge,
    NoResponse,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutingError::None => "none",
            RoutingError::NoRoute => "no route",
            RoutingError::GotNak => "got nak",
            RoutingError::Timeout => "timeout",
            RoutingError::NoInterface => "no interface",
            RoutingError::MaxRetransmit => "max retransmit",
            RoutingError::NoChannel => "no channel",
            RoutingError::TooLarge => "too large",
            RoutingError::NoResponse => "no response",
        };
        f.write_str(name)
    }
}

/// The routing control record carried in ack/nak payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routing {
    pub error_reason: RoutingError,
}

impl Routing {
    /// Encode with the node's binary serializer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode from a routing-port payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// A decoded application payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    pub portnum: PortNum,
    pub payload: Vec<u8>,
    /// Packet id this payload responds to, zero when not a response.
    pub request_id: PacketId,
}

/// The payload of a mesh packet: either decoded for us, or still
/// ciphertext destined for another channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadVariant {
    Decoded(Data),
    Encrypted(Vec<u8>),
}

/// A packet as seen above the radio: addressing, delivery flags, and
/// receive-side metadata stamped by the interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPacket {
    pub from: NodeNum,
    pub to: NodeNum,
    pub id: PacketId,
    /// Remaining rebroadcast hops; zero means neighbors only.
    pub hop_limit: u8,
    /// Sender requested delivery confirmation.
    pub want_ack: bool,
    /// Seconds-epoch receive time, zero when the clock was unset.
    pub rx_time: u32,
    /// Signal-to-noise ratio of the receive, in dB.
    pub rx_snr: f32,
    pub priority: Priority,
    pub payload: Option<PayloadVariant>,
}

impl MeshPacket {
    /// The decoded payload, if this packet carries one.
    #[must_use]
    pub fn decoded(&self) -> Option<&Data> {
        match &self.payload {
            Some(PayloadVariant::Decoded(d)) => Some(d),
            _ => None,
        }
    }

    /// The pending-table key for this packet, with phone-bridge origin
    /// (`from == 0`) attributed to the local node.
    pub fn global_id(&self, local: NodeNum) -> GlobalPacketId {
        GlobalPacketId::new(effective_from(self, local), self.id)
    }
}

/// Resolve a packet's originator.
///
/// Packets injected by the phone-side bridge carry `from == 0` and are
/// treated as originating on the local node.
pub fn effective_from(p: &MeshPacket, local: NodeNum) -> NodeNum {
    if p.from.as_u32() == 0 {
        local
    } else {
        p.from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_levels_are_ordered() {
        assert!(Priority::Ack > Priority::Reliable);
        assert!(Priority::Reliable > Priority::Default);
        assert!(Priority::Ack.level() > Priority::Default.level());
        assert_eq!(Priority::Ack.level(), 120);
    }

    #[test]
    fn routing_record_roundtrip() {
        let c = Routing {
            error_reason: RoutingError::MaxRetransmit,
        };
        let bytes = c.to_bytes().unwrap();
        assert_eq!(Routing::from_bytes(&bytes).unwrap(), c);
    }

    #[test]
    fn routing_record_rejects_garbage() {
        assert!(Routing::from_bytes(&[0xFF, 0xFF]).is_err());
    }

    #[test]
    fn decoded_accessor() {
        let mut p = MeshPacket::default();
        assert!(p.decoded().is_none());

        p.payload = Some(PayloadVariant::Encrypted(vec![1, 2, 3]));
        assert!(p.decoded().is_none());

        p.payload = Some(PayloadVariant::Decoded(Data {
            portnum: PortNum::Routing,
            payload: vec![],
            request_id: PacketId::new(7),
        }));
        assert_eq!(p.decoded().unwrap().request_id, PacketId::new(7));
    }

    #[test]
    fn phone_origin_resolves_to_local_node() {
        let local = NodeNum::new(0x1234);
        let p = MeshPacket {
            from: NodeNum::new(0),
            id: PacketId::new(0xAA),
            ..Default::default()
        };
        assert_eq!(effective_from(&p, local), local);
        assert_eq!(p.global_id(local), GlobalPacketId::new(local, PacketId::new(0xAA)));

        let q = MeshPacket {
            from: NodeNum::new(0x5678),
            ..Default::default()
        };
        assert_eq!(effective_from(&q, local), NodeNum::new(0x5678));
    }
}
