//! The seam to the flooding router below us.

use loramesh_core::{MeshPacket, NodeNum, Routing};

use crate::error::RouterError;

/// Capabilities the flooding substrate exposes to the reliable layer.
///
/// The substrate owns rebroadcast, hop-limit handling, and dedup. The
/// reliable layer forwards every hook to it after doing its own work,
/// and uses the retransmission-interval oracle to schedule retries
/// (the interval depends on the radio's current airtime settings).
pub trait FloodingRouter {
    /// The local node number.
    fn node_num(&self) -> NodeNum;

    /// Enqueue a packet for flooding.
    fn send(&mut self, p: MeshPacket) -> Result<(), RouterError>;

    /// Whether a received packet should be dropped (dedup etc.).
    fn should_filter_received(&mut self, p: &MeshPacket) -> bool;

    /// Observe a received packet and its routing control record, if any.
    fn sniff_received(&mut self, p: &MeshPacket, routing: Option<&Routing>);

    /// Milliseconds to wait before retransmitting `p`.
    fn retransmission_interval_ms(&self, p: &MeshPacket) -> u32;
}

/// Diagnostic dump of a packet, tagged with where it was seen.
pub fn print_packet(tag: &str, p: &MeshPacket) {
    tracing::debug!(
        from = %p.from,
        to = %p.to,
        id = %p.id,
        hop_limit = p.hop_limit,
        want_ack = p.want_ack,
        "{tag}"
    );
}
