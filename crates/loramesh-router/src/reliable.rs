//! The reliable router: retransmission, acks, and naks.
//!
//! Layers over a [`FloodingRouter`] and forwards every hook to it. Three
//! things end a pending retransmission: an implicit ack (a neighbor is
//! overheard rebroadcasting our own broadcast), an explicit ack or nak
//! from the destination, or retry exhaustion, which naks the originator
//! ourselves.

use loramesh_core::packet::effective_from;
use loramesh_core::timing::until;
use loramesh_core::{
    Data, GlobalPacketId, MeshPacket, NodeNum, PacketId, PacketIdSource, PayloadVariant, PortNum,
    Priority, Routing, RoutingError,
};

use crate::error::RouterError;
use crate::pending::{decide_retransmission, PendingPacket, PendingTable, RetransmitDecision};
use crate::substrate::{print_packet, FloodingRouter};

/// Reliable delivery layered over a flooding substrate.
pub struct ReliableRouter<F> {
    inner: F,
    pending: PendingTable,
    ids: PacketIdSource,
    /// Set by the plugin chain when an earlier handler already queued a
    /// reply to the packet being dispatched; suppresses the redundant
    /// ack. Covers a single `sniff_received` call.
    reply_queued: bool,
    /// Packets addressed to ourselves (implicit acks, exhaustion naks)
    /// awaiting pickup by the local application transport.
    local_delivery: Vec<MeshPacket>,
}

impl<F: FloodingRouter> ReliableRouter<F> {
    pub fn new(inner: F, ids: PacketIdSource) -> Self {
        Self {
            inner,
            pending: PendingTable::new(),
            ids,
            reply_queued: false,
            local_delivery: Vec::new(),
        }
    }

    /// The local node number, as reported by the substrate.
    pub fn node_num(&self) -> NodeNum {
        self.inner.node_num()
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// The packet id allocator, shared with boot-time setup.
    pub fn ids_mut(&mut self) -> &mut PacketIdSource {
        &mut self.ids
    }

    /// Number of packets awaiting acknowledgement.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn has_pending(&self, key: &GlobalPacketId) -> bool {
        self.pending.contains(key)
    }

    /// Send a packet, enqueueing a retransmission record when the
    /// sender asked for an ack.
    pub fn send(&mut self, mut p: MeshPacket, now_ms: u32) -> Result<(), RouterError> {
        if p.want_ack {
            // An acked broadcast needs at least one hop so the first
            // neighbor rebroadcasts it and we can overhear the echo.
            if p.to.is_broadcast() && p.hop_limit == 0 {
                p.hop_limit = 1;
            }
            self.start_retransmission(p.clone(), now_ms);
        }

        self.inner.send(p)
    }

    /// Send a packet that may be addressed to ourselves. Locally
    /// addressed packets skip the air and land in the delivery queue.
    pub fn send_local(&mut self, p: MeshPacket, now_ms: u32) -> Result<(), RouterError> {
        if p.to == self.node_num() {
            self.local_delivery.push(p);
            Ok(())
        } else {
            self.send(p, now_ms)
        }
    }

    /// Drain packets delivered to the local node.
    pub fn take_local_delivery(&mut self) -> Vec<MeshPacket> {
        std::mem::take(&mut self.local_delivery)
    }

    /// Mark that a handler earlier in the plugin chain already queued a
    /// reply to the packet about to be sniffed.
    pub fn note_reply_queued(&mut self) {
        self.reply_queued = true;
    }

    fn start_retransmission(&mut self, p: MeshPacket, now_ms: u32) {
        let key = p.global_id(self.node_num());

        // An existing record under this key means the id allocator
        // wrapped into a live id; drop the stale attempt.
        if self.stop_retransmission(key) {
            tracing::warn!(key = %key, "packet id reused while in flight, dropping old record");
        }

        let interval = self.inner.retransmission_interval_ms(&p);
        let rec = PendingPacket::new(p, now_ms.wrapping_add(interval));
        tracing::debug!(key = %key, interval_ms = interval, "tracking packet for retransmission");
        self.pending.insert(key, rec);
    }

    /// Stop any retransmissions of the given originator/id pair,
    /// releasing the owned packet. Returns whether a record existed.
    pub fn stop_retransmission(&mut self, key: GlobalPacketId) -> bool {
        self.pending.remove(&key).is_some()
    }

    /// Receive-side filter. Checks for the implicit-ack pattern before
    /// delegating to the substrate's dedup.
    ///
    /// A broadcast carrying our own node number as the sender is a
    /// neighbor rebroadcasting one of our attempts. The first such echo
    /// cancels the retransmission and acks the sending process. Note the
    /// raw `from` is compared, not the phone-resolved one: packets the
    /// phone injected have not been on the air under our number.
    pub fn should_filter_received(&mut self, p: &MeshPacket, now_ms: u32) -> bool {
        if p.to.is_broadcast() && p.from == self.node_num() {
            print_packet("rx own rebroadcast", p);

            let key = p.global_id(self.node_num());
            if self.stop_retransmission(key) {
                tracing::debug!(id = %p.id, "overheard rebroadcast, generating implicit ack");
                // The echo itself is not marked want_ack; the ack is for
                // the local sender, not the neighbor.
                if let Err(e) =
                    self.send_ack_nak(RoutingError::None, key.from, p.id, now_ms)
                {
                    tracing::warn!("implicit ack failed: {e}");
                }
            }
        }

        self.inner.should_filter_received(p)
    }

    /// Observe a received packet. Packets addressed to us are acked on
    /// request and classified as ack or nak against the pending table;
    /// everything is then forwarded to the substrate.
    pub fn sniff_received(&mut self, p: &MeshPacket, routing: Option<&Routing>, now_ms: u32) {
        let our_node = self.node_num();

        // Only zero-hop reliability: ack/nak/want_ack packets for other
        // destinations are not our business.
        if p.to == our_node {
            if p.want_ack {
                if self.reply_queued {
                    tracing::debug!(id = %p.id, "reply already queued, skipping ack");
                } else {
                    let to = effective_from(p, our_node);
                    if let Err(e) = self.send_ack_nak(RoutingError::None, to, p.id, now_ms) {
                        tracing::warn!("ack send failed: {e}");
                    }
                }
            }

            let request_id = p.decoded().map_or(PacketId::ZERO, |d| d.request_id);

            // An ack is a plain response or a routing record without an
            // error; a nak is a routing record with one.
            let is_nak = routing.is_some_and(|c| c.error_reason != RoutingError::None);

            // Deleting a nonexistent record is harmless, so duplicates
            // need no special handling.
            if !request_id.is_zero() {
                let key = GlobalPacketId::new(p.to, request_id);
                if is_nak {
                    tracing::debug!(id = %request_id, "received nak, stopping retransmissions");
                } else {
                    tracing::debug!(id = %request_id, "received ack, stopping retransmissions");
                }
                self.stop_retransmission(key);
            }
        }

        self.reply_queued = false;
        self.inner.sniff_received(p, routing);
    }

    /// Walk the pending table: retransmit due entries, nak exhausted
    /// ones. Returns the wrap-safe delay until the next deadline, or
    /// `i32::MAX` when nothing is pending.
    pub fn do_retransmissions(&mut self, now_ms: u32) -> i32 {
        let our_node = self.node_num();
        let mut next_delay = i32::MAX;

        // Walk a key snapshot: entries may be erased mid-walk.
        for key in self.pending.keys() {
            let decision = match self.pending.get(&key) {
                Some(rec) => {
                    decide_retransmission(rec.num_retransmissions, rec.next_tx_msec, now_ms)
                }
                None => continue,
            };

            match decision {
                RetransmitDecision::Exhausted => {
                    if let Some(rec) = self.pending.remove(&key) {
                        tracing::warn!(
                            from = %rec.packet.from,
                            to = %rec.packet.to,
                            id = %rec.packet.id,
                            "reliable send failed, naking originator"
                        );
                        let to = effective_from(&rec.packet, our_node);
                        if let Err(e) = self.send_ack_nak(
                            RoutingError::MaxRetransmit,
                            to,
                            rec.packet.id,
                            now_ms,
                        ) {
                            tracing::warn!("nak send failed: {e}");
                        }
                    }
                }
                RetransmitDecision::Retransmit => {
                    let copy = match self.pending.get(&key) {
                        Some(rec) => rec.packet.clone(),
                        None => continue,
                    };
                    let interval = self.inner.retransmission_interval_ms(&copy);

                    // Straight to the flooding layer: going through our
                    // own send would enqueue a second pending record.
                    print_packet("retransmitting", &copy);
                    if let Err(e) = self.inner.send(copy) {
                        tracing::warn!(key = %key, "retransmission failed: {e}");
                    }

                    if let Some(rec) = self.pending.get_mut(&key) {
                        rec.num_retransmissions -= 1;
                        rec.next_tx_msec = now_ms.wrapping_add(interval);
                    }
                }
                RetransmitDecision::Wait => {}
            }

            if let Some(rec) = self.pending.get(&key) {
                next_delay = next_delay.min(until(now_ms, rec.next_tx_msec));
            }
        }

        next_delay
    }

    /// Build and dispatch an ack or nak: a routing control record at ack
    /// priority, neighbors only, responding to `request_id`.
    pub fn send_ack_nak(
        &mut self,
        err: RoutingError,
        to: NodeNum,
        request_id: PacketId,
        now_ms: u32,
    ) -> Result<(), RouterError> {
        let routing = Routing { error_reason: err };
        let payload = routing
            .to_bytes()
            .map_err(|e| RouterError::Codec(e.to_string()))?;

        let p = MeshPacket {
            from: self.node_num(),
            to,
            id: self.ids.next_id(),
            hop_limit: 0,
            priority: Priority::Ack,
            payload: Some(PayloadVariant::Decoded(Data {
                portnum: PortNum::Routing,
                payload,
                request_id,
            })),
            ..Default::default()
        };

        tracing::debug!(err = %err, to = %to, request_id = %request_id, id = %p.id, "sending ack/nak");
        self.send_local(p, now_ms)
    }
}
