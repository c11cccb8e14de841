//! Per-session connection state: the transport state machine shared by the
//! receive, send and timer tasks.

use super::reorder::{Accepted, ReorderBuffer};
use super::retransmit::RetransmitTable;
use crate::config::ClientConfig;
use crate::protocol::{Packet, PacketFlags, next_packet_id};
use bytes::Bytes;
use log::{debug, trace};
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, handshake not yet sent.
    Fresh,
    /// Hello sent, waiting for the peer's session grant.
    Handshaking,
    /// Session granted; command traffic flows.
    Established,
    /// Peer went silent past the timeout; reconnect pending.
    TimedOut,
    /// Disposed. Terminal.
    Closed,
}

/// Transport counters, exposed read-only to applications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub retransmits: u64,
    /// Microseconds, from the newest clean (never re-sent) ack sample.
    pub last_rtt_micros: Option<u64>,
}

/// What an inbound datagram amounted to.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Handshake completed; an immediate ack is owed to the peer.
    SessionEstablished,
    /// In-order command payloads ready for the dispatcher.
    Deliver(Vec<Bytes>),
    /// Consumed for its transport effects only.
    Ignored,
}

/// Result of a liveness check.
#[derive(Debug, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// The session died and a replacement attempt is open; its hello is
    /// available from [`ConnectionState::handshake_packet`]. `lost_session`
    /// is set when user code had seen the connection up.
    Reconnect { lost_session: bool },
}

fn random_session_id() -> u16 {
    rand::random::<u16>() & 0x7FFF
}

pub struct ConnectionState {
    phase: SessionPhase,
    session_id: u16,
    next_pkt_id: u16,
    ack_owed: bool,
    last_recv: Instant,
    retransmit: RetransmitTable,
    reorder: ReorderBuffer,
    stats: ConnectionStats,
    inflight_window: u16,
    retransmit_interval: Duration,
    timeout_interval: Duration,
}

impl ConnectionState {
    pub fn new(config: &ClientConfig) -> ConnectionState {
        ConnectionState {
            phase: SessionPhase::Fresh,
            session_id: random_session_id(),
            next_pkt_id: 1,
            ack_owed: false,
            last_recv: Instant::now(),
            retransmit: RetransmitTable::new(usize::from(config.inflight_window)),
            reorder: ReorderBuffer::new(0),
            stats: ConnectionStats::default(),
            inflight_window: config.inflight_window,
            retransmit_interval: config.retransmit_interval(),
            timeout_interval: config.timeout_interval(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn is_established(&self) -> bool {
        self.phase == SessionPhase::Established
    }

    /// Opens a new session attempt: fresh random session id, in-flight and
    /// reorder state abandoned. The hello to transmit is available from
    /// [`handshake_packet`](Self::handshake_packet).
    pub fn begin_handshake(&mut self) {
        self.session_id = random_session_id();
        self.next_pkt_id = 1;
        self.ack_owed = false;
        self.retransmit.clear();
        self.reorder.reset(0);
        self.last_recv = Instant::now();
        self.phase = SessionPhase::Handshaking;
        debug!(
            "handshake started with proposed session id {:#06x}",
            self.session_id
        );
    }

    /// A re-send of the hello for the current session attempt.
    pub fn handshake_packet(&self) -> Packet {
        Packet::handshake(self.session_id)
    }

    /// An unconditional ack of everything delivered so far.
    pub fn ack_packet(&self) -> Packet {
        Packet::ack_only(self.session_id, self.reorder.last_delivered())
    }

    /// Feeds one decoded datagram through the state machine.
    pub fn handle_incoming(&mut self, packet: &Packet, now: Instant) -> Inbound {
        if matches!(self.phase, SessionPhase::Fresh | SessionPhase::Closed) {
            return Inbound::Ignored;
        }

        self.stats.packets_received += 1;
        self.last_recv = now;
        let header = &packet.header;

        // The peer may impose a different session id at any time; peer wins.
        if header.session_id != self.session_id {
            debug!(
                "adopting peer session id {:#06x} (was {:#06x})",
                header.session_id, self.session_id
            );
            self.session_id = header.session_id;
        }

        if header.flags.contains(PacketFlags::ACK) {
            let coverage =
                self.retransmit
                    .apply_ack(header.acked_pkt_id, self.inflight_window, now);
            if coverage.removed > 0 {
                trace!(
                    "ack {:#06x} cleared {} in-flight packets",
                    header.acked_pkt_id, coverage.removed
                );
            }
            if coverage.rtt_micros.is_some() {
                self.stats.last_rtt_micros = coverage.rtt_micros;
            }
        }

        if header.flags.contains(PacketFlags::REQUEST_RETRANSMIT) {
            // Not acted on; the reorder buffer gap-fills on its own.
            debug!(
                "peer set RequestRetransmit (acked {:#06x}); ignoring",
                header.acked_pkt_id
            );
        }

        if header.flags.contains(PacketFlags::NEW_SESSION_ID) {
            if self.phase == SessionPhase::Handshaking {
                self.phase = SessionPhase::Established;
                self.reorder.reset(header.pkt_id);
                self.ack_owed = false;
                debug!(
                    "session {:#06x} established at peer pkt id {:#06x}",
                    self.session_id, header.pkt_id
                );
                return Inbound::SessionEstablished;
            }
            debug!("ignoring NewSessionId flag outside handshake");
        }

        if header.flags.contains(PacketFlags::ACK_REQUEST) {
            self.ack_owed = true;
        }

        if packet.has_commands() && self.phase == SessionPhase::Established {
            match self.reorder.accept(header.pkt_id, packet.payload.clone()) {
                Accepted::Delivered(payloads) => return Inbound::Deliver(payloads),
                Accepted::Duplicate => {
                    // Payload already seen; the ack debt recorded above stands.
                    trace!("duplicate packet {:#06x}", header.pkt_id);
                }
                Accepted::Staged => {
                    trace!("staged out-of-order packet {:#06x}", header.pkt_id);
                }
                Accepted::OutOfWindow => {
                    debug!("dropping implausible packet id {:#06x}", header.pkt_id);
                }
            }
        }

        Inbound::Ignored
    }

    /// The coalesced ack, when one is owed. Clears the debt.
    pub fn take_ack(&mut self) -> Option<Packet> {
        if self.ack_owed && self.phase == SessionPhase::Established {
            self.ack_owed = false;
            Some(self.ack_packet())
        } else {
            None
        }
    }

    /// `true` when a data packet may be built right now.
    pub fn can_send(&self) -> bool {
        self.phase == SessionPhase::Established && !self.retransmit.is_full()
    }

    /// Assigns the next packet id to `payload`, records the packet for
    /// retransmission and returns it for transmission.
    pub fn make_data_packet(&mut self, payload: Bytes, now: Instant) -> Option<Packet> {
        if !self.can_send() {
            return None;
        }
        let pkt_id = self.next_pkt_id;
        self.next_pkt_id = next_packet_id(self.next_pkt_id);
        let packet = Packet::data(
            self.session_id,
            pkt_id,
            self.reorder.last_delivered(),
            payload,
        );
        self.retransmit
            .insert(pkt_id, packet.clone(), now, self.retransmit_interval);
        self.stats.packets_sent += 1;
        Some(packet)
    }

    /// Packets past their retransmit deadline, flagged and re-armed.
    pub fn due_retransmits(&mut self, now: Instant) -> Vec<Packet> {
        if self.phase != SessionPhase::Established {
            return Vec::new();
        }
        let resends = self.retransmit.due(now, self.retransmit_interval);
        self.stats.retransmits += resends.len() as u64;
        resends
    }

    /// Declares the session dead after peer silence and opens a replacement.
    pub fn check_liveness(&mut self, now: Instant) -> Liveness {
        match self.phase {
            SessionPhase::Handshaking | SessionPhase::Established
                if now.duration_since(self.last_recv) > self.timeout_interval =>
            {
                let lost_session = self.phase == SessionPhase::Established;
                self.phase = SessionPhase::TimedOut;
                if lost_session {
                    debug!("session {:#06x} timed out", self.session_id);
                }
                self.begin_handshake();
                Liveness::Reconnect { lost_session }
            }
            _ => Liveness::Alive,
        }
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Pending outbound count still awaiting acknowledgement.
    pub fn inflight_len(&self) -> usize {
        self.retransmit.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig {
            auto_connect: false,
            ..ClientConfig::default()
        }
    }

    fn established_state() -> ConnectionState {
        let mut state = ConnectionState::new(&test_config());
        state.begin_handshake();
        let reply = handshake_reply(state.session_id(), 0x0001);
        match state.handle_incoming(&reply, Instant::now()) {
            Inbound::SessionEstablished => {}
            other => panic!("handshake reply not honored: {:?}", other),
        }
        state
    }

    fn handshake_reply(session_id: u16, pkt_id: u16) -> Packet {
        let mut packet = Packet::new(
            PacketFlags::NEW_SESSION_ID | PacketFlags::ACK_REQUEST,
            session_id,
            0,
            pkt_id,
            Bytes::new(),
        );
        packet.header.unknown_b = 0x0068;
        packet
    }

    fn data_from_peer(session_id: u16, pkt_id: u16) -> Packet {
        let mut packet = Packet::data(session_id, pkt_id, 0, Bytes::from_static(&[0xAB]));
        packet.header.flags = PacketFlags::ACK_REQUEST;
        packet
    }

    #[test]
    fn handshake_reply_establishes_and_owes_an_immediate_ack() {
        let mut state = ConnectionState::new(&test_config());
        state.begin_handshake();
        assert_eq!(state.phase(), SessionPhase::Handshaking);
        let hello = state.handshake_packet();
        assert_eq!(hello.header.session_id, state.session_id());
        assert!(hello.header.flags.contains(PacketFlags::NEW_SESSION_ID));

        let reply = handshake_reply(0x5678, 0x0001);
        let outcome = state.handle_incoming(&reply, Instant::now());
        assert_eq!(outcome, Inbound::SessionEstablished);
        assert_eq!(state.phase(), SessionPhase::Established);
        // Peer's session id replaced ours.
        assert_eq!(state.session_id(), 0x5678);

        // The ack to transmit covers the peer's handshake pkt id.
        let ack = state.ack_packet();
        assert_eq!(ack.header.session_id, 0x5678);
        assert_eq!(ack.header.acked_pkt_id, 0x0001);
        assert!(ack.header.flags.contains(PacketFlags::ACK));
    }

    #[test]
    fn outbound_headers_carry_the_adopted_session_id() {
        let mut state = established_state();
        let sid = state.session_id();
        let packet = state
            .make_data_packet(Bytes::from_static(&[1]), Instant::now())
            .unwrap();
        assert_eq!(packet.header.session_id, sid);
        assert_eq!(packet.header.pkt_id, 1);
    }

    #[test]
    fn session_id_drift_is_adopted_mid_session() {
        let mut state = established_state();
        let drifted = data_from_peer(0x0123, 0x0002);
        let _ = state.handle_incoming(&drifted, Instant::now());
        assert_eq!(state.session_id(), 0x0123);
        assert_eq!(state.phase(), SessionPhase::Established);
    }

    #[test]
    fn packet_ids_are_contiguous_mod_range() {
        let mut state = established_state();
        let now = Instant::now();
        let first = state.make_data_packet(Bytes::from_static(&[1]), now).unwrap();
        let second = state.make_data_packet(Bytes::from_static(&[2]), now).unwrap();
        assert_eq!(
            next_packet_id(first.header.pkt_id),
            second.header.pkt_id
        );
    }

    #[test]
    fn ack_request_sets_debt_and_take_ack_clears_it() {
        let mut state = established_state();
        let sid = state.session_id();
        let _ = state.handle_incoming(&data_from_peer(sid, 0x0002), Instant::now());

        let ack = state.take_ack().expect("ack owed");
        assert_eq!(ack.header.acked_pkt_id, 0x0002);
        assert!(state.take_ack().is_none());
    }

    #[test]
    fn duplicate_payload_is_dropped_but_still_acked() {
        let mut state = established_state();
        let sid = state.session_id();
        let packet = data_from_peer(sid, 0x0002);

        match state.handle_incoming(&packet, Instant::now()) {
            Inbound::Deliver(payloads) => assert_eq!(payloads.len(), 1),
            other => panic!("expected delivery, got {:?}", other),
        }
        let _ = state.take_ack();

        // Same id again: no delivery, but ack debt returns.
        assert_eq!(
            state.handle_incoming(&packet, Instant::now()),
            Inbound::Ignored
        );
        assert!(state.take_ack().is_some());
    }

    #[test]
    fn inbound_ack_clears_inflight() {
        let mut state = established_state();
        let now = Instant::now();
        let packet = state.make_data_packet(Bytes::from_static(&[1]), now).unwrap();
        assert_eq!(state.inflight_len(), 1);

        let mut ack = Packet::ack_only(state.session_id(), packet.header.pkt_id);
        ack.header.flags = PacketFlags::ACK;
        let _ = state.handle_incoming(&ack, now);
        assert_eq!(state.inflight_len(), 0);
    }

    #[test]
    fn timeout_reconnects_with_fresh_session_id() {
        let mut state = established_state();
        let old_sid = state.session_id();
        let now = Instant::now() + Duration::from_millis(5_100);

        match state.check_liveness(now) {
            Liveness::Reconnect { lost_session } => assert!(lost_session),
            Liveness::Alive => panic!("expected timeout"),
        }
        let handshake = state.handshake_packet();
        assert_eq!(handshake.header.session_id, state.session_id());
        assert!(handshake.header.flags.contains(PacketFlags::NEW_SESSION_ID));
        assert_eq!(state.phase(), SessionPhase::Handshaking);
        // New attempt, new random id; in-flight state abandoned.
        assert_ne!(state.session_id(), old_sid);
        assert_eq!(state.inflight_len(), 0);
        assert!(!state.can_send());
    }

    #[test]
    fn handshake_timeout_does_not_report_a_lost_session() {
        let mut state = ConnectionState::new(&test_config());
        state.begin_handshake();
        let now = Instant::now() + Duration::from_millis(5_100);
        match state.check_liveness(now) {
            Liveness::Reconnect { lost_session } => assert!(!lost_session),
            Liveness::Alive => panic!("expected handshake timeout"),
        }
    }

    #[test]
    fn closed_state_ignores_traffic() {
        let mut state = established_state();
        state.close();
        let packet = data_from_peer(state.session_id(), 0x0002);
        assert_eq!(
            state.handle_incoming(&packet, Instant::now()),
            Inbound::Ignored
        );
        assert_eq!(state.check_liveness(Instant::now()), Liveness::Alive);
        assert!(state.make_data_packet(Bytes::new(), Instant::now()).is_none());
    }
}
