//! Decode pipeline between the ordered packet stream and user callbacks.

use crate::commands::{CommandRegistry, DecodedCommand, ProtocolVersion};
use crate::protocol::CommandBlock;
use crate::transfer::TransferHandler;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub(crate) struct Dispatcher {
    registry: CommandRegistry,
    transfer: Box<dyn TransferHandler>,
    /// Dialect in effect for decoding; pinned by the peer's `_ver`.
    negotiated: Option<ProtocolVersion>,
    /// Published copy for `AtemClient::connection_version`.
    shared_version: Arc<AtomicU32>,
    /// Set once the peer's initial state dump finished (`InCm`).
    init_complete: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        registry: CommandRegistry,
        transfer: Box<dyn TransferHandler>,
        shared_version: Arc<AtomicU32>,
        init_complete: Arc<AtomicBool>,
    ) -> Dispatcher {
        Dispatcher {
            registry,
            transfer,
            negotiated: None,
            shared_version,
            init_complete,
        }
    }

    /// Handshake completed: any transfer in progress is void and the state
    /// dump starts over.
    pub fn on_connected(&mut self) {
        self.init_complete.store(false, Ordering::Relaxed);
        self.transfer.reset();
    }

    /// Decodes one batch of ordered command blocks, filters out commands the
    /// transfer collaborator claims and returns the remainder for delivery.
    ///
    /// A block that fails to decode is dropped alone; the batch proceeds.
    pub fn decode_batch(&mut self, blocks: Vec<CommandBlock>) -> Vec<DecodedCommand> {
        let mut delivered = Vec::with_capacity(blocks.len());

        for block in blocks {
            // Re-read per block: a version command keys every decode after it.
            let version = self.negotiated.unwrap_or(ProtocolVersion::MINIMUM);
            let Some(spec) = self.registry.find(block.name, version) else {
                debug!(
                    "unknown command {} ({} byte body): {}",
                    block.name,
                    block.body.len(),
                    hex::encode(&block.body)
                );
                continue;
            };
            let command = match spec.decode(&block) {
                Ok(command) => command,
                Err(e) => {
                    warn!("dropping command: {}", e);
                    continue;
                }
            };

            match &command {
                DecodedCommand::Version(peer_version) => {
                    self.negotiated = Some(*peer_version);
                    self.shared_version
                        .store(peer_version.to_u32(), Ordering::Relaxed);
                    debug!("peer speaks protocol {}", peer_version);
                }
                DecodedCommand::InitComplete => {
                    self.init_complete.store(true, Ordering::Relaxed);
                }
                _ => {}
            }

            if self.transfer.handle(&command) {
                continue;
            }
            delivered.push(command);
        }

        delivered
    }

    pub fn dispose(&mut self) {
        self.transfer.dispose();
    }
}
