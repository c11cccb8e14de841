//! Outbound control commands.
//!
//! Each setter refines its queue key to the mix effect it targets, so rapid
//! updates to the same control collapse in the send queue while different
//! mix effects stay independent.

use super::{ProtocolVersion, QueueKey, SerializeCommand};
use crate::protocol::CommandName;
use bytes::{BufMut, Bytes, BytesMut};

/// `CPgI`: set the program bus source on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramInputSet {
    pub mix_effect: u8,
    pub source: u16,
}

impl SerializeCommand for ProgramInputSet {
    fn name(&self) -> CommandName {
        CommandName(*b"CPgI")
    }

    fn serialize(&self, _version: ProtocolVersion) -> Bytes {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(self.mix_effect);
        out.put_u8(0);
        out.put_u16(self.source);
        out.freeze()
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.mix_effect))
    }
}

/// `CPvI`: set the preview bus source on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewInputSet {
    pub mix_effect: u8,
    pub source: u16,
}

impl SerializeCommand for PreviewInputSet {
    fn name(&self) -> CommandName {
        CommandName(*b"CPvI")
    }

    fn serialize(&self, _version: ProtocolVersion) -> Bytes {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(self.mix_effect);
        out.put_u8(0);
        out.put_u16(self.source);
        out.freeze()
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.mix_effect))
    }
}

/// `CTPs`: position the transition handle, 0..=10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPositionSet {
    pub mix_effect: u8,
    pub position: u16,
}

impl SerializeCommand for TransitionPositionSet {
    fn name(&self) -> CommandName {
        CommandName(*b"CTPs")
    }

    fn serialize(&self, _version: ProtocolVersion) -> Bytes {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(self.mix_effect);
        out.put_u8(0);
        out.put_u16(self.position.min(10_000));
        out.freeze()
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.mix_effect))
    }
}

/// `DCut`: perform a cut on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    pub mix_effect: u8,
}

impl SerializeCommand for Cut {
    fn name(&self) -> CommandName {
        CommandName(*b"DCut")
    }

    fn serialize(&self, _version: ProtocolVersion) -> Bytes {
        Bytes::from(vec![self.mix_effect, 0, 0, 0])
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.mix_effect))
    }
}

/// `DAut`: run the configured auto transition on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoTransition {
    pub mix_effect: u8,
}

impl SerializeCommand for AutoTransition {
    fn name(&self) -> CommandName {
        CommandName(*b"DAut")
    }

    fn serialize(&self, _version: ProtocolVersion) -> Bytes {
        Bytes::from(vec![self.mix_effect, 0, 0, 0])
    }

    fn queue_key(&self) -> QueueKey {
        QueueKey::scoped(self.name(), u16::from(self.mix_effect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn program_input_set_serializes_me_and_source() {
        let cmd = ProgramInputSet {
            mix_effect: 1,
            source: 3020,
        };
        let body = cmd.serialize(ProtocolVersion::MINIMUM);
        assert_eq!(&body[..], &[0x01, 0x00, 0x0B, 0xCC]);
    }

    #[test]
    fn transition_position_clamps_to_full_travel() {
        let cmd = TransitionPositionSet {
            mix_effect: 0,
            position: 60_000,
        };
        let mut body = cmd.serialize(ProtocolVersion::MINIMUM);
        body.advance(2);
        assert_eq!(body.get_u16(), 10_000);
    }

    #[test]
    fn setter_keys_are_scoped_per_mix_effect() {
        let a = TransitionPositionSet {
            mix_effect: 0,
            position: 1,
        };
        let b = TransitionPositionSet {
            mix_effect: 1,
            position: 1,
        };
        assert_ne!(a.queue_key(), b.queue_key());
        assert_eq!(
            a.queue_key(),
            TransitionPositionSet {
                mix_effect: 0,
                position: 9999,
            }
            .queue_key()
        );
    }

    #[test]
    fn framed_block_carries_name_and_body() {
        let block = Cut { mix_effect: 0 }.to_block(ProtocolVersion::MINIMUM);
        assert_eq!(block.name, CommandName(*b"DCut"));
        assert_eq!(block.encoded_len(), 12);
    }
}
