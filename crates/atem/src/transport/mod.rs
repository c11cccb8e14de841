//! Session, reliability and scheduling state for the command channel.

pub mod reorder;
pub mod retransmit;
pub mod session;
pub mod unique_queue;

pub use reorder::{Accepted, ReorderBuffer};
pub use retransmit::{AckCoverage, InFlightPacket, RetransmitTable};
pub use session::{ConnectionState, ConnectionStats, Inbound, Liveness, SessionPhase};
pub use unique_queue::UniqueQueue;
