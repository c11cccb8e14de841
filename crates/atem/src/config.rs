//! Client timing and sizing configuration.

use crate::error::AtemError;
use crate::protocol::{HALF_ID_RANGE, HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one client connection.
///
/// The defaults match the device family's observed behavior; only the
/// ordering `ack < retransmit < timeout` is contractual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ack coalescing interval in milliseconds.
    pub ack_interval_ms: u64,
    /// Deadline before an unacked packet is re-sent, in milliseconds.
    pub retransmit_interval_ms: u64,
    /// Peer silence before the session is declared dead, in milliseconds.
    pub timeout_interval_ms: u64,
    /// Maximum unacked packets in flight.
    pub inflight_window: u16,
    /// Datagram size budget for outbound packing, header included.
    pub max_packet_size: usize,
    /// Start the handshake as soon as the client is constructed.
    pub auto_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ack_interval_ms: 10,
            retransmit_interval_ms: 80,
            timeout_interval_ms: 5_000,
            inflight_window: 64,
            max_packet_size: 1_416,
            auto_connect: true,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), AtemError> {
        if self.ack_interval_ms == 0 {
            return Err(AtemError::Config("ack interval must be non-zero".into()));
        }
        if self.ack_interval_ms >= self.retransmit_interval_ms
            || self.retransmit_interval_ms >= self.timeout_interval_ms
        {
            return Err(AtemError::Config(format!(
                "interval ordering violated: ack {} ms < retransmit {} ms < timeout {} ms required",
                self.ack_interval_ms, self.retransmit_interval_ms, self.timeout_interval_ms
            )));
        }
        if self.inflight_window == 0 || self.inflight_window > HALF_ID_RANGE {
            return Err(AtemError::Config(format!(
                "in-flight window {} outside 1..={}",
                self.inflight_window, HALF_ID_RANGE
            )));
        }
        // Room for the header and at least one small command block.
        if self.max_packet_size < HEADER_SIZE + 16 {
            return Err(AtemError::Config(format!(
                "max packet size {} too small",
                self.max_packet_size
            )));
        }
        if self.max_packet_size > 0x07FF {
            return Err(AtemError::Config(format!(
                "max packet size {} exceeds the 11-bit length field",
                self.max_packet_size
            )));
        }
        Ok(())
    }

    pub fn ack_interval(&self) -> Duration {
        Duration::from_millis(self.ack_interval_ms)
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    pub fn timeout_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn interval_ordering_is_enforced() {
        let config = ClientConfig {
            ack_interval_ms: 100,
            retransmit_interval_ms: 50,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            retransmit_interval_ms: 5_000,
            timeout_interval_ms: 5_000,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn window_bounds_are_enforced() {
        let config = ClientConfig {
            inflight_window: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            inflight_window: HALF_ID_RANGE + 1,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn packet_size_bounds_are_enforced() {
        let config = ClientConfig {
            max_packet_size: 8,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            max_packet_size: 4_096,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
