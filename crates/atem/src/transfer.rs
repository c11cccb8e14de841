//! Seam for the data-transfer collaborator.
//!
//! Stills, macros and other bulk payloads ride the command channel through
//! their own multi-command state machines. The dispatcher offers every
//! decoded command to the handler before user delivery; claimed commands are
//! consumed silently.

use crate::commands::DecodedCommand;

pub trait TransferHandler: Send {
    /// Returns `true` when the command belongs to a transfer in progress and
    /// must not reach the user.
    fn handle(&mut self, command: &DecodedCommand) -> bool;

    /// Invoked on every handshake completion; any transfer in progress is
    /// void on the new session.
    fn reset(&mut self);

    /// Invoked once at client teardown.
    fn dispose(&mut self) {}
}

/// Handler for clients that do no bulk transfers: claims nothing.
#[derive(Debug, Default)]
pub struct NullTransferHandler;

impl TransferHandler for NullTransferHandler {
    fn handle(&mut self, _command: &DecodedCommand) -> bool {
        false
    }

    fn reset(&mut self) {}
}
