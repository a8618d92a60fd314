//! Newtype wrappers for mesh identifiers.
//!
//! These types prevent accidental mixing of node numbers, packet ids,
//! and raw integers that share the same underlying representation.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::NUM_RESERVED;

/// A 32-bit node number identifying a peer on the mesh.
///
/// The all-ones value is the broadcast address; values below
/// [`NUM_RESERVED`] are reserved and never self-assigned.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[must_use]
pub struct NodeNum(pub(crate) u32);

impl NodeNum {
    /// The broadcast address, delivered to all neighbors.
    pub const BROADCAST: Self = Self(u32::MAX);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use = "returns the raw value without modifying the node number"]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        self.0 == u32::MAX
    }

    /// Whether this number falls in the reserved low range.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 < NUM_RESERVED
    }
}

impl fmt::Display for NodeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The canonical textual node id, as used for default user ids.
        write!(f, "!{:08x}", self.0)
    }
}

impl fmt::Debug for NodeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeNum({:#x})", self.0)
    }
}

impl From<u32> for NodeNum {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// A locally allocated, monotonically advancing packet id.
///
/// Zero is the "unset" sentinel: a decoded payload with
/// `request_id == PacketId::ZERO` acknowledges nothing.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[must_use]
pub struct PacketId(pub(crate) u32);

impl PacketId {
    /// The unset sentinel.
    pub const ZERO: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use = "returns the raw value without modifying the packet id"]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({:#x})", self.0)
    }
}

impl From<u32> for PacketId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// The mesh-wide key for an in-flight packet: originator plus packet id.
///
/// Uniqueness is assumed across the realistic window of in-flight
/// packets; the pending-retransmission table is keyed on this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct GlobalPacketId {
    pub from: NodeNum,
    pub id: PacketId,
}

impl GlobalPacketId {
    pub const fn new(from: NodeNum, id: PacketId) -> Self {
        Self { from, id }
    }
}

impl fmt::Display for GlobalPacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_all_ones() {
        assert_eq!(NodeNum::BROADCAST.as_u32(), 0xFFFF_FFFF);
        assert!(NodeNum::BROADCAST.is_broadcast());
        assert!(!NodeNum::new(0x1234).is_broadcast());
    }

    #[test]
    fn reserved_range_is_exclusive() {
        assert!(NodeNum::new(0).is_reserved());
        assert!(NodeNum::new(NUM_RESERVED - 1).is_reserved());
        assert!(!NodeNum::new(NUM_RESERVED).is_reserved());
    }

    #[test]
    fn node_num_display_is_bang_hex() {
        assert_eq!(NodeNum::new(0x12AB).to_string(), "!000012ab");
    }

    #[test]
    fn packet_id_zero_sentinel() {
        assert!(PacketId::ZERO.is_zero());
        assert!(!PacketId::new(0xAA).is_zero());
    }

    #[test]
    fn global_packet_id_equality() {
        let a = GlobalPacketId::new(NodeNum::new(1), PacketId::new(2));
        let b = GlobalPacketId::new(NodeNum::new(1), PacketId::new(2));
        let c = GlobalPacketId::new(NodeNum::new(2), PacketId::new(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
