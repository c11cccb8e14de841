//! The fixed 12-byte transport header carried by every datagram.

use atem_binary::{BinaryError, BinaryReader, BinaryWriter};
use bytes::Buf;
use std::fmt;

/// Encoded size of the transport header.
pub const HEADER_SIZE: usize = 12;

/// Largest value representable by the 11-bit length field.
pub const MAX_LENGTH: u16 = 0x07FF;

/// The five flag bits packed into the high bits of the header's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(pub u8);

impl PacketFlags {
    /// The sender wants this packet acknowledged.
    pub const ACK_REQUEST: PacketFlags = PacketFlags(0x01);
    /// Session establishment: the carried session id replaces the receiver's.
    pub const NEW_SESSION_ID: PacketFlags = PacketFlags(0x02);
    /// This datagram is a re-send of an earlier packet id.
    pub const IS_RETRANSMIT: PacketFlags = PacketFlags(0x04);
    /// The sender believes packets were lost and asks for them again.
    pub const REQUEST_RETRANSMIT: PacketFlags = PacketFlags(0x08);
    /// `acked_pkt_id` is meaningful.
    pub const ACK: PacketFlags = PacketFlags(0x10);

    /// All five defined bits.
    pub const MASK: u8 = 0x1F;

    #[inline]
    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;

    #[inline]
    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        PacketFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PacketFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: PacketFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in [
            (PacketFlags::ACK_REQUEST, "AckRequest"),
            (PacketFlags::NEW_SESSION_ID, "NewSessionId"),
            (PacketFlags::IS_RETRANSMIT, "IsRetransmit"),
            (PacketFlags::REQUEST_RETRANSMIT, "RequestRetransmit"),
            (PacketFlags::ACK, "Ack"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "None")?;
        }
        Ok(())
    }
}

/// Decoded transport header.
///
/// `length` counts the entire datagram including these 12 bytes. All ids are
/// 15-bit values; the topmost bit of their fields is unused on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub flags: PacketFlags,
    pub length: u16,
    pub session_id: u16,
    pub acked_pkt_id: u16,
    /// Bytes 6-7; always zero in client traffic.
    pub unknown_a: u16,
    /// Bytes 8-9; carries the 0x0068 magic on handshake.
    pub unknown_b: u16,
    pub pkt_id: u16,
}

impl PacketHeader {
    /// Parses the header from the front of `buf`.
    pub fn parse<B: Buf>(buf: &mut B) -> Result<PacketHeader, BinaryError> {
        let first = buf.read_u8()?;
        let flags = PacketFlags((first >> 3) & PacketFlags::MASK);
        let length = (u16::from(first & 0x07) << 8) | u16::from(buf.read_u8()?);
        Ok(PacketHeader {
            flags,
            length,
            session_id: buf.read_u16()?,
            acked_pkt_id: buf.read_u16()?,
            unknown_a: buf.read_u16()?,
            unknown_b: buf.read_u16()?,
            pkt_id: buf.read_u16()?,
        })
    }

    /// Serializes the header.
    pub fn serialize<B: BinaryWriter>(&self, out: &mut B) -> Result<(), BinaryError> {
        out.write_u8((self.flags.0 << 3) | ((self.length >> 8) as u8 & 0x07))?;
        out.write_u8(self.length as u8)?;
        out.write_u16(self.session_id)?;
        out.write_u16(self.acked_pkt_id)?;
        out.write_u16(self.unknown_a)?;
        out.write_u16(self.unknown_b)?;
        out.write_u16(self.pkt_id)?;
        Ok(())
    }
}
