//! The command registry: an explicit, startup-populated mapping from
//! `(name, protocol version)` to a decoder.

use super::{DecodedCommand, ProtocolVersion, inbound};
use crate::error::AtemError;
use crate::protocol::{CommandBlock, CommandName};
use atem_binary::BinaryError;
use bytes::Bytes;
use std::collections::HashMap;

type DecodeFn = fn(&mut Bytes) -> Result<DecodedCommand, BinaryError>;

/// One registered command codec.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: CommandName,
    /// Oldest protocol version this codec applies to.
    pub since: ProtocolVersion,
    /// Whether the decoder may leave body bytes unread. Commands that grew
    /// across firmware versions keep decoding their known prefix.
    pub accepts_trailing: bool,
    decode: DecodeFn,
}

impl CommandSpec {
    /// Decodes `block` and enforces full-body consumption unless the command
    /// accepts trailing bytes.
    pub fn decode(&self, block: &CommandBlock) -> Result<DecodedCommand, AtemError> {
        let mut body = block.body.clone();
        let command = (self.decode)(&mut body).map_err(|e| AtemError::CommandDecode {
            name: self.name,
            reason: e.to_string(),
        })?;
        if !body.is_empty() && !self.accepts_trailing {
            return Err(AtemError::CommandDecode {
                name: self.name,
                reason: format!("{} unconsumed trailing bytes", body.len()),
            });
        }
        Ok(command)
    }
}

/// Lookup table from command name to its per-version codecs.
pub struct CommandRegistry {
    entries: HashMap<CommandName, Vec<CommandSpec>>,
}

impl CommandRegistry {
    pub fn empty() -> CommandRegistry {
        CommandRegistry {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-populated with the commands the core understands.
    pub fn new() -> CommandRegistry {
        let mut registry = CommandRegistry::empty();
        registry.register(*b"_ver", ProtocolVersion::MINIMUM, false, inbound::decode_version);
        registry.register(
            *b"InCm",
            ProtocolVersion::MINIMUM,
            true,
            inbound::decode_init_complete,
        );
        registry.register(
            *b"PrgI",
            ProtocolVersion::MINIMUM,
            false,
            inbound::decode_program_input,
        );
        registry.register(
            *b"PrvI",
            ProtocolVersion::MINIMUM,
            false,
            inbound::decode_preview_input,
        );
        registry.register(
            *b"TrPs",
            ProtocolVersion::MINIMUM,
            false,
            inbound::decode_transition_position,
        );
        registry.register(*b"Time", ProtocolVersion::MINIMUM, true, inbound::decode_time_code);
        registry
    }

    /// Registers a codec for `name` taking effect at version `since`.
    pub fn register(
        &mut self,
        name: [u8; 4],
        since: ProtocolVersion,
        accepts_trailing: bool,
        decode: DecodeFn,
    ) {
        let name = CommandName(name);
        let specs = self.entries.entry(name).or_default();
        specs.push(CommandSpec {
            name,
            since,
            accepts_trailing,
            decode,
        });
        // Newest dialect first, so lookup takes the first match.
        specs.sort_by(|a, b| b.since.cmp(&a.since));
    }

    /// Finds the codec for `name` under the negotiated `version`.
    pub fn find(&self, name: CommandName, version: ProtocolVersion) -> Option<&CommandSpec> {
        self.entries
            .get(&name)?
            .iter()
            .find(|spec| spec.since <= version)
    }
}

impl Default for CommandRegistry {
    fn default() -> CommandRegistry {
        CommandRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atem_binary::BinaryReader;

    fn decode_marker_old(_body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
        Ok(DecodedCommand::InitComplete)
    }

    fn decode_marker_new(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
        let major = body.read_u16()?;
        let minor = body.read_u16()?;
        Ok(DecodedCommand::Version(ProtocolVersion::new(major, minor)))
    }

    #[test]
    fn find_picks_newest_codec_at_or_below_version() {
        let mut registry = CommandRegistry::empty();
        registry.register(*b"XXyy", ProtocolVersion::new(2, 28), true, decode_marker_old);
        registry.register(*b"XXyy", ProtocolVersion::new(2, 31), true, decode_marker_new);

        let name = CommandName(*b"XXyy");
        let old = registry.find(name, ProtocolVersion::new(2, 30)).unwrap();
        assert_eq!(old.since, ProtocolVersion::new(2, 28));

        let new = registry.find(name, ProtocolVersion::new(2, 31)).unwrap();
        assert_eq!(new.since, ProtocolVersion::new(2, 31));

        assert!(registry.find(name, ProtocolVersion::new(2, 27)).is_none());
    }

    #[test]
    fn unknown_name_finds_nothing() {
        let registry = CommandRegistry::new();
        assert!(
            registry
                .find(CommandName(*b"ZZZZ"), ProtocolVersion::V2_31)
                .is_none()
        );
    }

    #[test]
    fn strict_codec_rejects_trailing_bytes() {
        let registry = CommandRegistry::new();
        let spec = registry
            .find(CommandName(*b"PrgI"), ProtocolVersion::MINIMUM)
            .unwrap();

        // One byte more than the codec consumes.
        let block = CommandBlock::new(
            CommandName(*b"PrgI"),
            Bytes::from_static(&[0, 0, 0x0B, 0xC2, 0xFF]),
        );
        assert!(matches!(
            spec.decode(&block),
            Err(AtemError::CommandDecode { .. })
        ));
    }

    #[test]
    fn growable_codec_accepts_trailing_bytes() {
        let registry = CommandRegistry::new();
        let spec = registry
            .find(CommandName(*b"Time"), ProtocolVersion::MINIMUM)
            .unwrap();

        let block = CommandBlock::new(
            CommandName(*b"Time"),
            Bytes::from_static(&[10, 20, 30, 12, 0xDE, 0xAD, 0xBE, 0xEF]),
        );
        assert_eq!(
            spec.decode(&block).unwrap(),
            DecodedCommand::TimeCode(crate::commands::TimeCode {
                hour: 10,
                minute: 20,
                second: 30,
                frame: 12,
            })
        );
    }

    #[test]
    fn short_body_is_a_decode_error() {
        let registry = CommandRegistry::new();
        let spec = registry
            .find(CommandName(*b"_ver"), ProtocolVersion::MINIMUM)
            .unwrap();
        let block = CommandBlock::new(CommandName(*b"_ver"), Bytes::from_static(&[0x00]));
        assert!(spec.decode(&block).is_err());
    }
}
