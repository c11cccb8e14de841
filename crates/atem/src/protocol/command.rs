//! Command-block framing: the length-prefixed, 4-byte-named payload units
//! carried inside a data datagram.

use atem_binary::{BinaryError, BinaryReader, BinaryWriter};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Size of the per-block header: length (2), reserved (2), name (4).
pub const BLOCK_HEADER_SIZE: usize = 8;

/// A 4-byte ASCII command identifier, e.g. `PrgI`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandName(pub [u8; 4]);

impl CommandName {
    pub const fn new(name: [u8; 4]) -> CommandName {
        CommandName(name)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandName({})", self)
    }
}

/// One framed command: a name and its body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    pub name: CommandName,
    pub body: Bytes,
}

impl CommandBlock {
    pub fn new(name: CommandName, body: Bytes) -> CommandBlock {
        CommandBlock { name, body }
    }

    /// Encoded size including the 8-byte block header.
    pub fn encoded_len(&self) -> usize {
        BLOCK_HEADER_SIZE + self.body.len()
    }

    /// Appends the encoded block to `out`.
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), BinaryError> {
        let len = self.encoded_len();
        if len > usize::from(u16::MAX) {
            return Err(BinaryError::InvalidData(format!(
                "command body too large: {} bytes",
                self.body.len()
            )));
        }
        out.write_u16(len as u16)?;
        out.write_u16(0)?; // reserved
        out.write_name4(self.name.0)?;
        out.write_bytes(&self.body)?;
        Ok(())
    }

    /// Encodes a single block into an owned buffer.
    pub fn encode_to_bytes(&self) -> Result<Bytes, BinaryError> {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut out)?;
        Ok(out.freeze())
    }

    /// Parses every command block in `payload`.
    ///
    /// Parsing is strict: a declared length smaller than the block header or
    /// larger than what remains aborts the whole datagram.
    pub fn parse_all(payload: &mut Bytes) -> Result<Vec<CommandBlock>, BinaryError> {
        let mut blocks = Vec::new();
        while !payload.is_empty() {
            let declared = usize::from(payload.read_u16()?);
            if declared < BLOCK_HEADER_SIZE {
                return Err(BinaryError::InvalidData(format!(
                    "command length {} below block header size",
                    declared
                )));
            }
            let body_len = declared - BLOCK_HEADER_SIZE;
            payload.skip(2)?; // reserved
            let name = CommandName(payload.read_name4()?);
            if body_len > payload.len() {
                return Err(BinaryError::InvalidData(format!(
                    "command {} declares {} body bytes with {} remaining",
                    name,
                    body_len,
                    payload.len()
                )));
            }
            let body = payload.read_bytes(body_len)?;
            blocks.push(CommandBlock { name, body });
        }
        Ok(blocks)
    }
}
