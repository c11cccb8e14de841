//! Bookkeeping for unacknowledged outbound packets.

use crate::protocol::{Packet, id_distance};
use std::time::Duration;
use tokio::time::Instant;

/// One outbound packet awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct InFlightPacket {
    pub packet: Packet,
    pub first_sent: Instant,
    pub deadline: Instant,
    pub retries: u32,
}

/// What an inbound ack removed from the table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AckCoverage {
    pub removed: usize,
    /// Round trip of the exactly-acked packet, when it was never re-sent.
    pub rtt_micros: Option<u64>,
}

/// In-flight packets in id-assignment order, bounded by the configured
/// window. Entries leave exactly once, when a covering ack arrives; a packet
/// is never dropped for age alone.
pub struct RetransmitTable {
    inflight: Vec<(u16, InFlightPacket)>,
    capacity: usize,
}

impl RetransmitTable {
    pub fn new(capacity: usize) -> RetransmitTable {
        RetransmitTable {
            inflight: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inflight.len() >= self.capacity
    }

    /// Records a freshly sent packet. The caller assigns ids in order and
    /// checks [`is_full`](Self::is_full) first.
    pub fn insert(&mut self, pkt_id: u16, packet: Packet, now: Instant, interval: Duration) {
        debug_assert!(!self.is_full(), "retransmit table over its window");
        self.inflight.push((
            pkt_id,
            InFlightPacket {
                packet,
                first_sent: now,
                deadline: now + interval,
                retries: 0,
            },
        ));
    }

    /// Removes every in-flight id `i` with `(acked − i) mod 2^15 < window`.
    pub fn apply_ack(&mut self, acked: u16, window: u16, now: Instant) -> AckCoverage {
        let mut coverage = AckCoverage::default();
        self.inflight.retain(|(id, entry)| {
            let covered = id_distance(*id, acked) < window;
            if covered {
                coverage.removed += 1;
                if *id == acked && entry.retries == 0 {
                    coverage.rtt_micros =
                        Some(now.duration_since(entry.first_sent).as_micros() as u64);
                }
            }
            !covered
        });
        coverage
    }

    /// Packets whose deadline has elapsed, flagged for retransmission. Each
    /// returned entry has its deadline pushed out and its retry count bumped.
    pub fn due(&mut self, now: Instant, interval: Duration) -> Vec<Packet> {
        let mut resends = Vec::new();
        for (_, entry) in &mut self.inflight {
            if entry.deadline <= now {
                entry.deadline = now + interval;
                entry.retries += 1;
                resends.push(entry.packet.as_retransmit());
            }
        }
        resends
    }

    /// Abandons all in-flight packets, as on session reset.
    pub fn clear(&mut self) {
        self.inflight.clear();
    }
}
