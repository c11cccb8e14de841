//! Whole-datagram parse and serialize, plus constructors for the fixed
//! control datagrams (handshake, ack-only, data).

use super::header::{HEADER_SIZE, MAX_LENGTH, PacketFlags, PacketHeader};
use atem_binary::{BinaryError, BinaryWriter};
use bytes::{Bytes, BytesMut};

/// Magic carried in `unknown_b` of the handshake datagram.
pub const HANDSHAKE_MAGIC: u16 = 0x0068;

/// Opaque body of the client hello, fixed by the protocol.
pub const HANDSHAKE_BODY: [u8; 8] = [0x01, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];

/// A decoded datagram: header plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Builds a packet, deriving the header length field from the payload.
    pub fn new(
        flags: PacketFlags,
        session_id: u16,
        acked_pkt_id: u16,
        pkt_id: u16,
        payload: Bytes,
    ) -> Packet {
        Packet {
            header: PacketHeader {
                flags,
                length: (HEADER_SIZE + payload.len()) as u16,
                session_id,
                acked_pkt_id,
                unknown_a: 0,
                unknown_b: 0,
                pkt_id,
            },
            payload,
        }
    }

    /// The fixed 20-byte client hello opening a session.
    pub fn handshake(session_id: u16) -> Packet {
        let mut packet = Packet::new(
            PacketFlags::NEW_SESSION_ID,
            session_id,
            0,
            0,
            Bytes::from_static(&HANDSHAKE_BODY),
        );
        packet.header.unknown_b = HANDSHAKE_MAGIC;
        packet
    }

    /// A header-only acknowledgement of everything up to `acked_pkt_id`.
    pub fn ack_only(session_id: u16, acked_pkt_id: u16) -> Packet {
        Packet::new(PacketFlags::ACK, session_id, acked_pkt_id, 0, Bytes::new())
    }

    /// A command-bearing packet. Data packets request acknowledgement and
    /// piggyback the current inbound ack state.
    pub fn data(session_id: u16, pkt_id: u16, acked_pkt_id: u16, payload: Bytes) -> Packet {
        Packet::new(
            PacketFlags::ACK_REQUEST | PacketFlags::ACK,
            session_id,
            acked_pkt_id,
            pkt_id,
            payload,
        )
    }

    /// A copy of this packet flagged as a retransmission. Everything else,
    /// including the packet id, is unchanged.
    pub fn as_retransmit(&self) -> Packet {
        let mut packet = self.clone();
        packet.header.flags |= PacketFlags::IS_RETRANSMIT;
        packet
    }

    /// Decodes a received datagram. The header length field must agree with
    /// the actual datagram size.
    pub fn decode(datagram: &[u8]) -> Result<Packet, BinaryError> {
        let mut buf = Bytes::copy_from_slice(datagram);
        let header = PacketHeader::parse(&mut buf)?;
        if usize::from(header.length) != datagram.len() {
            return Err(BinaryError::InvalidData(format!(
                "header length {} disagrees with datagram length {}",
                header.length,
                datagram.len()
            )));
        }
        Ok(Packet {
            header,
            payload: buf,
        })
    }

    /// Serializes the packet into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes, BinaryError> {
        let total = HEADER_SIZE + self.payload.len();
        if total > usize::from(MAX_LENGTH) {
            return Err(BinaryError::InvalidData(format!(
                "packet of {} bytes exceeds the 11-bit length field",
                total
            )));
        }
        let mut out = BytesMut::with_capacity(total);
        self.header.serialize(&mut out)?;
        out.write_bytes(&self.payload)?;
        Ok(out.freeze())
    }

    /// `true` when the payload carries command blocks.
    pub fn has_commands(&self) -> bool {
        !self.payload.is_empty()
    }
}
