//! Core protocol types for loramesh nodes.
//!
//! This crate defines the value types shared by every layer of the node
//! runtime: node numbers and packet ids, the in-memory packet model, the
//! routing control record carried in ack/nak packets, packet-id
//! allocation, and wrap-safe millisecond clock arithmetic. It performs
//! no I/O; higher layers (the reliable router and the device runtime)
//! build on these types.

pub mod constants;
pub mod idpool;
pub mod packet;
pub mod timing;
pub mod types;

pub use idpool::PacketIdSource;
pub use packet::{Data, MeshPacket, PayloadVariant, PortNum, Priority, Routing, RoutingError};
pub use types::{GlobalPacketId, NodeNum, PacketId};
