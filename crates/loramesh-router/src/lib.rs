//! Reliable delivery over a flooding mesh substrate.
//!
//! The flooding router below us takes care of rebroadcast, hop limits,
//! and dedup; this crate layers at-most-one-successful-delivery
//! semantics on top of it. Outbound packets that request acknowledgement
//! enter a pending-retransmission table and are re-sent on a timer until
//! an ack arrives (explicitly from the destination, or implicitly by
//! overhearing a neighbor rebroadcast our own broadcast) or until the
//! retry budget runs out, at which point the originator receives a nak.
//!
//! All time-dependent entry points take the millisecond clock as a
//! parameter, so the state machines are deterministic under test.

pub mod error;
pub mod pending;
pub mod reliable;
pub mod routing;
pub mod substrate;
pub mod testing;

pub use error::RouterError;
pub use pending::{decide_retransmission, PendingPacket, PendingTable, RetransmitDecision};
pub use reliable::ReliableRouter;
pub use substrate::{print_packet, FloodingRouter};
