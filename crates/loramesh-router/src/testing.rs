//! Test double for the flooding substrate.
//!
//! Records every hook invocation so tests can assert on what reached
//! the flooding layer, with a fixed retransmission interval for
//! deterministic scheduling.

use loramesh_core::{MeshPacket, NodeNum, Routing};

use crate::error::RouterError;
use crate::substrate::FloodingRouter;

/// A recording flooding substrate with a fixed retransmission interval.
pub struct MockFlood {
    node: NodeNum,
    /// Interval handed to the reliable layer for every packet.
    pub interval_ms: u32,
    /// Value returned from the dedup filter.
    pub filter_result: bool,
    /// Packets handed to the flooding layer, in order.
    pub sent: Vec<MeshPacket>,
    pub filter_calls: usize,
    pub sniff_calls: usize,
}

impl MockFlood {
    pub fn new(node: NodeNum) -> Self {
        Self {
            node,
            interval_ms: 5_000,
            filter_result: false,
            sent: Vec::new(),
            filter_calls: 0,
            sniff_calls: 0,
        }
    }
}

impl FloodingRouter for MockFlood {
    fn node_num(&self) -> NodeNum {
        self.node
    }

    fn send(&mut self, p: MeshPacket) -> Result<(), RouterError> {
        self.sent.push(p);
        Ok(())
    }

    fn should_filter_received(&mut self, _p: &MeshPacket) -> bool {
        self.filter_calls += 1;
        self.filter_result
    }

    fn sniff_received(&mut self, _p: &MeshPacket, _routing: Option<&Routing>) {
        self.sniff_calls += 1;
    }

    fn retransmission_interval_ms(&self, _p: &MeshPacket) -> u32 {
        self.interval_ms
    }
}
