//! Logging backend for the atem crates.
//!
//! Protocol tracing is noisy: every datagram, ack and retransmit can emit a
//! record, and the client's tasks must never stall on stdout. Records are
//! formatted on the caller's thread, handed to a dedicated writer thread
//! over a bounded channel, and dropped rather than blocked on when the
//! channel is full. The wire-level modules can be capped at a separate
//! level from the rest of the application, so a debug session does not
//! drown in per-packet trace lines.

use chrono::Local;
use log::{Level, Log, Metadata, Record, SetLoggerError, set_boxed_logger, set_max_level};
use std::io::{BufWriter, Write, stdout};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread;

/// Module prefixes governed by the wire-level cap.
const WIRE_TARGETS: [&str; 3] = ["atem::protocol", "atem::transport", "atem::net"];

enum WriterMessage {
    Record(String),
    Flush,
}

pub struct AtemLogger {
    app_level: Level,
    wire_level: Level,
    sender: SyncSender<WriterMessage>,
}

impl AtemLogger {
    /// Installs the logger with one level for everything.
    pub fn init(level: Level, buffer_size: usize) -> Result<(), SetLoggerError> {
        Self::init_with_wire_level(level, level, buffer_size)
    }

    /// Installs the logger with a separate cap for the wire-level modules.
    pub fn init_with_wire_level(
        app_level: Level,
        wire_level: Level,
        buffer_size: usize,
    ) -> Result<(), SetLoggerError> {
        let (sender, receiver) = mpsc::sync_channel(buffer_size);

        thread::Builder::new()
            .name("atem-log-writer".into())
            .spawn(move || write_loop(receiver))
            .expect("failed to spawn the log writer thread");

        let max = app_level.max(wire_level);
        set_boxed_logger(Box::new(AtemLogger {
            app_level,
            wire_level,
            sender,
        }))?;
        set_max_level(max.to_level_filter());
        Ok(())
    }

    fn cap_for(&self, target: &str) -> Level {
        if WIRE_TARGETS.iter().any(|prefix| target.starts_with(prefix)) {
            self.wire_level
        } else {
            self.app_level
        }
    }
}

/// Drains the channel into stdout, flushing whenever the queue runs dry so
/// interactive output stays current without paying a flush per record.
fn write_loop(receiver: Receiver<WriterMessage>) {
    let mut writer = BufWriter::new(stdout());
    loop {
        let message = match receiver.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => {
                let _ = writer.flush();
                match receiver.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                }
            }
            Err(TryRecvError::Disconnected) => break,
        };
        match message {
            WriterMessage::Record(line) => {
                if writer.write_all(line.as_bytes()).is_err() {
                    break;
                }
            }
            WriterMessage::Flush => {
                let _ = writer.flush();
            }
        }
    }
    let _ = writer.flush();
}

impl Log for AtemLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.cap_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // `atem::transport::session` reads better as `transport::session`.
        let target = record
            .target()
            .strip_prefix("atem::")
            .unwrap_or_else(|| record.target());
        let line = format!(
            "{} {:<5} {} | {}\n",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            target,
            record.args()
        );
        // A full queue means the writer is behind; dropping the record is
        // preferable to stalling a protocol task.
        let _ = self.sender.try_send(WriterMessage::Record(line));
    }

    fn flush(&self) {
        let _ = self.sender.send(WriterMessage::Flush);
    }
}
