//! Client networking core for the ATEM family of broadcast video switchers.
//!
//! Speaks the proprietary session-oriented control protocol over UDP:
//! handshake and session negotiation, acknowledgement and retransmission,
//! in-order command delivery, and a collapsing outbound queue that
//! deduplicates stale control updates before they reach the wire.
//!
//! The entry point is [`AtemClient`]; decoded traffic arrives as
//! [`AtemEvent`]s on the channel returned at construction.

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transfer;
pub mod transport;

mod dispatch;
mod net;

pub use client::{AtemClient, AtemEvent, OutboundMessage};
pub use commands::{DecodedCommand, ProtocolVersion, QueueKey, SerializeCommand};
pub use config::ClientConfig;
pub use error::{AtemError, Result};
pub use protocol::ATEM_PORT;
pub use transfer::{NullTransferHandler, TransferHandler};
pub use transport::ConnectionStats;
