//! Decoders for the inbound commands the core understands.

use super::{DecodedCommand, ProtocolVersion};
use atem_binary::{BinaryError, BinaryReader};
use bytes::Bytes;

/// A bus assignment on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSelection {
    pub mix_effect: u8,
    pub source: u16,
}

/// Transition progress on one mix effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPosition {
    pub mix_effect: u8,
    pub in_transition: bool,
    pub frames_remaining: u8,
    /// Handle position, 0..=10000.
    pub position: u16,
}

/// The switcher's running timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCode {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame: u8,
}

pub(super) fn decode_version(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    let major = body.read_u16()?;
    let minor = body.read_u16()?;
    Ok(DecodedCommand::Version(ProtocolVersion::new(major, minor)))
}

pub(super) fn decode_init_complete(_body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    // The body carries internal state counters the client has no use for.
    Ok(DecodedCommand::InitComplete)
}

fn decode_input_selection(body: &mut Bytes) -> Result<InputSelection, BinaryError> {
    let mix_effect = body.read_u8()?;
    body.skip(1)?;
    let source = body.read_u16()?;
    Ok(InputSelection { mix_effect, source })
}

pub(super) fn decode_program_input(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    Ok(DecodedCommand::ProgramInput(decode_input_selection(body)?))
}

pub(super) fn decode_preview_input(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    Ok(DecodedCommand::PreviewInput(decode_input_selection(body)?))
}

pub(super) fn decode_transition_position(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    let mix_effect = body.read_u8()?;
    let in_transition = body.read_bool()?;
    let frames_remaining = body.read_u8()?;
    body.skip(1)?;
    let position = body.read_u16()?;
    body.skip(2)?;
    Ok(DecodedCommand::TransitionPosition(TransitionPosition {
        mix_effect,
        in_transition,
        frames_remaining,
        position,
    }))
}

pub(super) fn decode_time_code(body: &mut Bytes) -> Result<DecodedCommand, BinaryError> {
    Ok(DecodedCommand::TimeCode(TimeCode {
        hour: body.read_u8()?,
        minute: body.read_u8()?,
        second: body.read_u8()?,
        frame: body.read_u8()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_decodes_major_minor() {
        let mut body = Bytes::from_static(&[0x00, 0x02, 0x00, 0x1E]);
        assert_eq!(
            decode_version(&mut body).unwrap(),
            DecodedCommand::Version(ProtocolVersion::new(2, 30))
        );
        assert!(body.is_empty());
    }

    #[test]
    fn program_input_decodes_me_and_source() {
        let mut body = Bytes::from_static(&[0x01, 0x00, 0x03, 0xE8]);
        assert_eq!(
            decode_program_input(&mut body).unwrap(),
            DecodedCommand::ProgramInput(InputSelection {
                mix_effect: 1,
                source: 1000,
            })
        );
    }

    #[test]
    fn transition_position_decodes_all_fields() {
        let mut body = Bytes::from_static(&[0x00, 0x01, 0x14, 0x00, 0x13, 0x88, 0x00, 0x00]);
        assert_eq!(
            decode_transition_position(&mut body).unwrap(),
            DecodedCommand::TransitionPosition(TransitionPosition {
                mix_effect: 0,
                in_transition: true,
                frames_remaining: 20,
                position: 5000,
            })
        );
        assert!(body.is_empty());
    }

    #[test]
    fn time_code_tolerates_short_reads_as_errors() {
        let mut body = Bytes::from_static(&[10, 20, 30]);
        assert!(decode_time_code(&mut body).is_err());
    }
}
