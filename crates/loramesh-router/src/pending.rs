//! The pending-retransmission table.
//!
//! One entry per outbound packet that requested an ack, keyed by
//! `(originator, packet id)`. The entry owns its packet until removal.

use std::collections::HashMap;

use loramesh_core::constants::NUM_RETRANSMISSIONS;
use loramesh_core::timing::deadline_reached;
use loramesh_core::{GlobalPacketId, MeshPacket};

/// A packet awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    /// The owned packet, released when the entry is removed.
    pub packet: MeshPacket,
    /// Absolute millisecond deadline of the next transmit.
    pub next_tx_msec: u32,
    /// Retransmissions left. The initial send already counted as the
    /// first attempt, so this starts one below the total budget.
    pub num_retransmissions: u8,
}

impl PendingPacket {
    pub fn new(packet: MeshPacket, next_tx_msec: u32) -> Self {
        Self {
            packet,
            next_tx_msec,
            num_retransmissions: NUM_RETRANSMISSIONS - 1,
        }
    }
}

/// Outcome of evaluating a pending entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitDecision {
    /// Deadline not reached yet.
    Wait,
    /// Deadline reached with retries left.
    Retransmit,
    /// Deadline reached with no retries left; nak and remove.
    Exhausted,
}

/// Decide what to do with a pending entry. Pure; fires at exact
/// deadline equality, wrap-safe across the 51-day clock rollover.
#[must_use]
pub fn decide_retransmission(
    num_retransmissions: u8,
    next_tx_msec: u32,
    now_ms: u32,
) -> RetransmitDecision {
    if !deadline_reached(now_ms, next_tx_msec) {
        RetransmitDecision::Wait
    } else if num_retransmissions == 0 {
        RetransmitDecision::Exhausted
    } else {
        RetransmitDecision::Retransmit
    }
}

/// Table of packets awaiting acknowledgement.
#[derive(Debug, Default)]
#[must_use]
pub struct PendingTable {
    entries: HashMap<GlobalPacketId, PendingPacket>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert an entry, returning any evicted record under the same key.
    /// A collision means the id allocator reused an id while the old
    /// attempt was still in flight; the old attempt is silently dropped.
    pub fn insert(&mut self, key: GlobalPacketId, rec: PendingPacket) -> Option<PendingPacket> {
        self.entries.insert(key, rec)
    }

    /// Remove an entry, releasing its packet.
    pub fn remove(&mut self, key: &GlobalPacketId) -> Option<PendingPacket> {
        self.entries.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &GlobalPacketId) -> Option<&PendingPacket> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &GlobalPacketId) -> Option<&mut PendingPacket> {
        self.entries.get_mut(key)
    }

    #[must_use]
    pub fn contains(&self, key: &GlobalPacketId) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of the current keys, so a walk can erase entries as it
    /// goes.
    #[must_use]
    pub fn keys(&self) -> Vec<GlobalPacketId> {
        self.entries.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loramesh_core::{NodeNum, PacketId};

    fn make_key(from: u32, id: u32) -> GlobalPacketId {
        GlobalPacketId::new(NodeNum::new(from), PacketId::new(id))
    }

    fn make_rec(next_tx: u32) -> PendingPacket {
        PendingPacket::new(MeshPacket::default(), next_tx)
    }

    #[test]
    fn new_record_has_remaining_budget() {
        let rec = make_rec(0);
        assert_eq!(rec.num_retransmissions, NUM_RETRANSMISSIONS - 1);
    }

    // === decide_retransmission boundaries ===

    #[test]
    fn decide_wait_before_deadline() {
        assert_eq!(decide_retransmission(2, 1000, 999), RetransmitDecision::Wait);
    }

    #[test]
    fn decide_fires_at_exact_deadline() {
        assert_eq!(
            decide_retransmission(2, 1000, 1000),
            RetransmitDecision::Retransmit
        );
    }

    #[test]
    fn decide_exhausted_when_budget_spent() {
        assert_eq!(
            decide_retransmission(0, 1000, 1000),
            RetransmitDecision::Exhausted
        );
    }

    #[test]
    fn decide_exhausted_waits_for_deadline() {
        // Even with no retries left, nothing happens before the deadline.
        assert_eq!(decide_retransmission(0, 1000, 500), RetransmitDecision::Wait);
    }

    #[test]
    fn decide_across_clock_rollover() {
        // Deadline shortly after the u32 wrap, clock just before it.
        assert_eq!(
            decide_retransmission(1, 5, u32::MAX - 10),
            RetransmitDecision::Wait
        );
        // Clock has wrapped past the deadline.
        assert_eq!(
            decide_retransmission(1, 5, 6),
            RetransmitDecision::Retransmit
        );
    }

    // === table semantics ===

    #[test]
    fn insert_evicts_colliding_key() {
        let mut table = PendingTable::new();
        let key = make_key(1, 2);

        assert!(table.insert(key, make_rec(100)).is_none());
        let evicted = table.insert(key, make_rec(200)).unwrap();
        assert_eq!(evicted.next_tx_msec, 100);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_missing_returns_none() {
        let mut table = PendingTable::new();
        assert!(table.remove(&make_key(1, 2)).is_none());
    }

    #[test]
    fn keys_snapshot_allows_erase_during_walk() {
        let mut table = PendingTable::new();
        table.insert(make_key(1, 1), make_rec(10));
        table.insert(make_key(1, 2), make_rec(20));

        for key in table.keys() {
            table.remove(&key);
        }
        assert!(table.is_empty());
    }
}
