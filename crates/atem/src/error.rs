use crate::protocol::CommandName;
use std::io;
use thiserror::Error;

/// Errors surfaced by the networking core.
///
/// Nothing here is fatal to the process: transport-level problems are
/// handled internally by retransmission and reconnection, and these values
/// reach callers only from the construction and configuration surfaces.
#[derive(Error, Debug)]
pub enum AtemError {
    /// An I/O error on the underlying UDP socket.
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error during binary serialization or deserialization.
    #[error("binary handling error: {0}")]
    Binary(#[from] atem_binary::BinaryError),

    /// A single command failed to decode.
    #[error("command {name} failed to decode: {reason}")]
    CommandDecode { name: CommandName, reason: String },

    /// The client configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The client has been disposed.
    #[error("client is closed")]
    Closed,
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, AtemError>;
