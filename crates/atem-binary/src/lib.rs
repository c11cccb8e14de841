//! Checked binary reading and writing for the switcher control protocol.
//!
//! The wire format is big-endian throughout, built from fixed-width integers,
//! 4-byte ASCII command names and fixed-length NUL-padded strings. These
//! extension traits layer EOF checking on top of the `bytes` buffer traits so
//! codec code can use `?` instead of panicking on short input.

use bytes::{Buf, BufMut, Bytes};
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors that can occur during binary operations.
#[derive(Error, Debug)]
pub enum BinaryError {
    /// Not enough bytes remaining in the buffer for the requested operation.
    #[error("not enough bytes in buffer: needed {needed}, remaining {remaining}")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// Attempted to read text that was not valid UTF-8.
    #[error("invalid UTF-8 string data: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// An invalid value was encountered.
    #[error("invalid data encountered: {0}")]
    InvalidData(String),
}

/// Result type alias for binary operations.
pub type Result<T> = std::result::Result<T, BinaryError>;

/// Checks if the buffer has enough remaining bytes and returns an error if not.
macro_rules! check_remaining {
    ($buf:expr, $len:expr) => {
        let needed = $len;
        let remaining = $buf.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
    };
}

/// Extension trait for `bytes::Buf` providing checked reads of the protocol's
/// primitive types.
pub trait BinaryReader: Buf {
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    #[inline]
    fn read_i8(&mut self) -> Result<i8> {
        check_remaining!(self, 1);
        Ok(self.get_i8())
    }

    /// Reads a single byte as a boolean (`0x00` is false, anything else is true).
    #[inline]
    fn read_bool(&mut self) -> Result<bool> {
        check_remaining!(self, 1);
        Ok(self.get_u8() != 0)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16())
    }

    #[inline]
    fn read_i16(&mut self) -> Result<i16> {
        check_remaining!(self, 2);
        Ok(self.get_i16())
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32())
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32> {
        check_remaining!(self, 4);
        Ok(self.get_i32())
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64())
    }

    #[inline]
    fn read_i64(&mut self) -> Result<i64> {
        check_remaining!(self, 8);
        Ok(self.get_i64())
    }

    /// Reads a 4-byte ASCII identifier, such as a command name.
    #[inline]
    fn read_name4(&mut self) -> Result<[u8; 4]> {
        check_remaining!(self, 4);
        let mut name = [0u8; 4];
        self.copy_to_slice(&mut name);
        Ok(name)
    }

    /// Reads exactly `len` bytes into an owned buffer.
    #[inline]
    fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        check_remaining!(self, len);
        Ok(self.copy_to_bytes(len))
    }

    /// Reads a fixed-length field holding a NUL-padded UTF-8 string.
    fn read_padded_string(&mut self, len: usize) -> Result<String> {
        check_remaining!(self, len);
        let mut raw = vec![0u8; len];
        self.copy_to_slice(&mut raw);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
        raw.truncate(end);
        Ok(String::from_utf8(raw)?)
    }

    /// Skips `len` bytes of padding or reserved space.
    #[inline]
    fn skip(&mut self, len: usize) -> Result<()> {
        check_remaining!(self, len);
        self.advance(len);
        Ok(())
    }
}

impl<B: Buf + ?Sized> BinaryReader for B {}

/// Extension trait for `bytes::BufMut` providing writes of the protocol's
/// primitive types.
///
/// Writes are infallible with a growable buffer; the `Result` return keeps
/// call sites symmetrical with the reader and leaves room for bounded
/// buffers.
pub trait BinaryWriter: BufMut {
    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put_u8(value);
        Ok(())
    }

    #[inline]
    fn write_i8(&mut self, value: i8) -> Result<()> {
        self.put_i8(value);
        Ok(())
    }

    #[inline]
    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put_u8(if value { 1 } else { 0 });
        Ok(())
    }

    #[inline]
    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.put_u16(value);
        Ok(())
    }

    #[inline]
    fn write_i16(&mut self, value: i16) -> Result<()> {
        self.put_i16(value);
        Ok(())
    }

    #[inline]
    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.put_u32(value);
        Ok(())
    }

    #[inline]
    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.put_i32(value);
        Ok(())
    }

    #[inline]
    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.put_u64(value);
        Ok(())
    }

    #[inline]
    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.put_i64(value);
        Ok(())
    }

    #[inline]
    fn write_name4(&mut self, name: [u8; 4]) -> Result<()> {
        self.put_slice(&name);
        Ok(())
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_slice(bytes);
        Ok(())
    }

    /// Writes a string into a fixed-length field, NUL-padded. The string is
    /// truncated at a character boundary if it exceeds the field.
    fn write_padded_string(&mut self, value: &str, len: usize) -> Result<()> {
        let mut raw = value.as_bytes();
        if raw.len() > len {
            let mut end = len;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            raw = &raw[..end];
        }
        self.put_slice(raw);
        self.put_bytes(0, len - raw.len());
        Ok(())
    }
}

impl<B: BufMut + ?Sized> BinaryWriter for B {}
