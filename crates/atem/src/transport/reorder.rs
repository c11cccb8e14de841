//! Staging area turning the peer's packet stream back into contiguous,
//! in-order command delivery.

use crate::protocol::{id_distance, id_not_after, next_packet_id};
use bytes::Bytes;
use std::collections::BTreeMap;

/// How far ahead of the contiguous run a packet may be staged. Anything
/// further is noise or an attack, not plausible reordering.
const MAX_STAGED_AHEAD: u16 = 0x0800;

/// Outcome of offering one inbound packet to the buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Accepted {
    /// The packet (and possibly staged successors) completed a run;
    /// payloads are in peer-send order.
    Delivered(Vec<Bytes>),
    /// Already delivered; the payload is discarded but the packet may still
    /// be acknowledged.
    Duplicate,
    /// Ahead of the contiguous run; parked until the gap fills.
    Staged,
    /// Too far ahead to be plausible; dropped.
    OutOfWindow,
}

pub struct ReorderBuffer {
    /// Highest id delivered in order; the base the peer counts from.
    last_delivered: u16,
    staged: BTreeMap<u16, Bytes>,
}

impl ReorderBuffer {
    /// A buffer expecting the peer's ids to continue from `base`.
    pub fn new(base: u16) -> ReorderBuffer {
        ReorderBuffer {
            last_delivered: base,
            staged: BTreeMap::new(),
        }
    }

    /// Id of the newest in-order packet, for ack emission.
    pub fn last_delivered(&self) -> u16 {
        self.last_delivered
    }

    /// Restarts the stream from `base`, dropping anything staged.
    pub fn reset(&mut self, base: u16) {
        self.last_delivered = base;
        self.staged.clear();
    }

    /// Offers one command-bearing packet to the buffer.
    pub fn accept(&mut self, pkt_id: u16, payload: Bytes) -> Accepted {
        if id_not_after(pkt_id, self.last_delivered) {
            return Accepted::Duplicate;
        }

        let expected = next_packet_id(self.last_delivered);
        if pkt_id == expected {
            let mut delivered = vec![payload];
            self.last_delivered = pkt_id;
            // Drain any staged successors the gap was hiding.
            loop {
                let next = next_packet_id(self.last_delivered);
                match self.staged.remove(&next) {
                    Some(staged) => {
                        delivered.push(staged);
                        self.last_delivered = next;
                    }
                    None => break,
                }
            }
            return Accepted::Delivered(delivered);
        }

        if id_distance(expected, pkt_id) >= MAX_STAGED_AHEAD {
            return Accepted::OutOfWindow;
        }
        self.staged.insert(pkt_id, payload);
        Accepted::Staged
    }

    #[cfg(test)]
    fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(tag: u8) -> Bytes {
        Bytes::from(vec![tag])
    }

    #[test]
    fn in_order_packets_deliver_immediately() {
        let mut buffer = ReorderBuffer::new(0);
        assert_eq!(
            buffer.accept(1, payload(1)),
            Accepted::Delivered(vec![payload(1)])
        );
        assert_eq!(
            buffer.accept(2, payload(2)),
            Accepted::Delivered(vec![payload(2)])
        );
        assert_eq!(buffer.last_delivered(), 2);
    }

    #[test]
    fn gap_stages_until_filled() {
        // Peer sends 1, 3, 2, 4; user must see 1, 2, 3, 4.
        let mut buffer = ReorderBuffer::new(0);
        assert_eq!(
            buffer.accept(1, payload(1)),
            Accepted::Delivered(vec![payload(1)])
        );
        assert_eq!(buffer.accept(3, payload(3)), Accepted::Staged);
        assert_eq!(
            buffer.accept(2, payload(2)),
            Accepted::Delivered(vec![payload(2), payload(3)])
        );
        assert_eq!(
            buffer.accept(4, payload(4)),
            Accepted::Delivered(vec![payload(4)])
        );
        assert_eq!(buffer.staged_len(), 0);
    }

    #[test]
    fn duplicates_are_flagged_not_delivered() {
        let mut buffer = ReorderBuffer::new(0);
        let _ = buffer.accept(1, payload(1));
        let _ = buffer.accept(2, payload(2));
        assert_eq!(buffer.accept(1, payload(1)), Accepted::Duplicate);
        assert_eq!(buffer.accept(2, payload(2)), Accepted::Duplicate);
        // The base itself is also a duplicate.
        assert_eq!(buffer.accept(0, payload(0)), Accepted::Duplicate);
    }

    #[test]
    fn delivery_continues_across_the_id_wrap() {
        let mut buffer = ReorderBuffer::new(0x7FFE);
        assert_eq!(
            buffer.accept(0x7FFF, payload(1)),
            Accepted::Delivered(vec![payload(1)])
        );
        assert_eq!(
            buffer.accept(0x0000, payload(2)),
            Accepted::Delivered(vec![payload(2)])
        );
        assert_eq!(buffer.last_delivered(), 0);
        assert_eq!(buffer.accept(0x7FFF, payload(1)), Accepted::Duplicate);
    }

    #[test]
    fn staging_across_the_wrap_drains_in_order() {
        let mut buffer = ReorderBuffer::new(0x7FFE);
        assert_eq!(buffer.accept(0x0000, payload(2)), Accepted::Staged);
        assert_eq!(buffer.accept(0x0001, payload(3)), Accepted::Staged);
        assert_eq!(
            buffer.accept(0x7FFF, payload(1)),
            Accepted::Delivered(vec![payload(1), payload(2), payload(3)])
        );
    }

    #[test]
    fn implausibly_distant_ids_are_dropped() {
        let mut buffer = ReorderBuffer::new(0);
        // Just inside the staging window parks; just past it drops.
        assert_eq!(buffer.accept(0x0800, payload(8)), Accepted::Staged);
        assert_eq!(buffer.accept(0x0801, payload(9)), Accepted::OutOfWindow);
        assert_eq!(buffer.staged_len(), 1);
    }

    #[test]
    fn reset_restarts_the_stream() {
        let mut buffer = ReorderBuffer::new(0);
        let _ = buffer.accept(2, payload(2));
        buffer.reset(10);
        assert_eq!(buffer.staged_len(), 0);
        assert_eq!(
            buffer.accept(11, payload(1)),
            Accepted::Delivered(vec![payload(1)])
        );
    }
}
