//! Dispatch glue between the reliable layer and the application.
//!
//! Every decoded packet passes through here after the receive filter:
//! routing-port payloads are decoded into their control record, the
//! reliable layer sniffs the result, and packets meant for this node
//! are handed up to the local application transport.

use loramesh_core::{MeshPacket, PortNum, Routing};

use crate::error::RouterError;
use crate::reliable::ReliableRouter;
use crate::substrate::{print_packet, FloodingRouter};

/// Process a received packet through the reliable layer.
///
/// Returns the packet when it should be delivered to the local
/// application transport: destination is broadcast or ourselves, and it
/// did not originate from the phone-side bridge; packets with
/// `from == 0` would just echo back to the phone.
pub fn handle_received<F: FloodingRouter>(
    router: &mut ReliableRouter<F>,
    p: &MeshPacket,
    now_ms: u32,
) -> Result<Option<MeshPacket>, RouterError> {
    let routing = match p.decoded() {
        Some(d) if d.portnum == PortNum::Routing => Some(
            Routing::from_bytes(&d.payload).map_err(|e| RouterError::Codec(e.to_string()))?,
        ),
        _ => None,
    };

    print_packet("routing sniffing", p);
    router.sniff_received(p, routing.as_ref(), now_ms);

    if (p.to.is_broadcast() || p.to == router.node_num()) && p.from.as_u32() != 0 {
        print_packet("delivering rx packet", p);
        Ok(Some(p.clone()))
    } else {
        Ok(None)
    }
}

/// Build a reply to a routing request.
///
/// Reserved for future routing requests; nothing sends them yet, so a
/// routing-port request yields a defined error rather than a reply.
pub fn alloc_reply(current_request: Option<&MeshPacket>) -> Result<Option<MeshPacket>, RouterError> {
    let req = current_request.ok_or(RouterError::NoCurrentRequest)?;

    if req.decoded().is_some_and(|d| d.portnum == PortNum::Routing) {
        return Err(RouterError::ReplyUnsupported);
    }

    Ok(None)
}
