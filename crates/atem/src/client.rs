//! The client: one UDP session toward a switcher, driven by four
//! cooperating tasks (receive, dispatch, send, timer) over shared
//! connection state.

use crate::commands::{
    CommandRegistry, DecodedCommand, ProtocolVersion, QueueKey, SerializeCommand,
};
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::{AtemError, Result};
use crate::net::{RECV_BUFFER_SIZE, Socket};
use crate::protocol::{CommandBlock, HEADER_SIZE, Packet};
use crate::transfer::{NullTransferHandler, TransferHandler};
use crate::transport::{ConnectionState, ConnectionStats, Inbound, Liveness, SessionPhase, UniqueQueue};
use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval};

/// Events delivered to the application, in dispatcher order.
#[derive(Debug)]
pub enum AtemEvent {
    /// Handshake completed; command traffic flows.
    Connected,
    /// A previously established session died. A reconnect is already in
    /// progress and a later `Connected` follows if it succeeds.
    Disconnected,
    /// One ordered batch of decoded commands.
    Receive(Vec<DecodedCommand>),
    /// Every decoded inbound datagram, for protocol-level observers.
    ReceivePacket(Packet),
}

/// Control traffic that bypasses the collapsing queue.
///
/// `Command` payloads go out in FIFO order relative to each other, deferred
/// as a unit while no session is up. The header-only control directives are
/// dispatched as soon as the send worker sees them, so a queued payload can
/// never wedge the handshake that would unblock it.
#[derive(Debug)]
pub enum OutboundMessage {
    /// Pre-framed command-block bytes to transmit without collapse.
    Command(Bytes),
    /// Header-only ack of everything delivered so far.
    Ack,
    /// Re-issue the hello for the current session attempt.
    Handshake,
}

enum DispatchItem {
    Connected,
    Disconnected,
    Blocks(Vec<CommandBlock>),
}

struct Shared {
    socket: Socket,
    state: Mutex<ConnectionState>,
    queue: UniqueQueue<QueueKey, Bytes>,
    events: mpsc::UnboundedSender<AtemEvent>,
    dispatch_tx: mpsc::UnboundedSender<DispatchItem>,
    direct_tx: mpsc::UnboundedSender<OutboundMessage>,
    phase_tx: watch::Sender<SessionPhase>,
    version: Arc<AtomicU32>,
    init_complete: Arc<AtomicBool>,
    direct_pending: AtomicUsize,
    config: ClientConfig,
}

impl Shared {
    async fn send_packet(&self, packet: &Packet) {
        match packet.encode() {
            Ok(bytes) => self.socket.send(&bytes).await,
            Err(e) => debug!("failed to encode outbound packet: {}", e),
        }
    }

    /// Hands `message` to the send worker. `false` once the worker is gone.
    fn queue_direct(&self, message: OutboundMessage) -> bool {
        self.direct_pending.fetch_add(1, Ordering::SeqCst);
        if self.direct_tx.send(message).is_err() {
            self.direct_pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Handle to one switcher connection.
///
/// Dropping the handle signals the worker tasks to stop; [`close`] also
/// waits for them.
///
/// [`close`]: AtemClient::close
pub struct AtemClient {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AtemClient {
    /// Creates a client for the switcher at `peer` with the default command
    /// registry and no transfer collaborator. Returns the event stream
    /// alongside the handle.
    pub async fn connect_to(
        peer: SocketAddr,
        config: ClientConfig,
    ) -> Result<(AtemClient, mpsc::UnboundedReceiver<AtemEvent>)> {
        Self::with_collaborators(
            peer,
            config,
            CommandRegistry::new(),
            Box::new(NullTransferHandler),
        )
        .await
    }

    /// Creates a client with a custom command registry and transfer
    /// collaborator.
    pub async fn with_collaborators(
        peer: SocketAddr,
        config: ClientConfig,
        registry: CommandRegistry,
        transfer: Box<dyn TransferHandler>,
    ) -> Result<(AtemClient, mpsc::UnboundedReceiver<AtemEvent>)> {
        config.validate()?;
        let socket = Socket::bind(peer).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (phase_tx, _) = watch::channel(SessionPhase::Fresh);
        let version = Arc::new(AtomicU32::new(0));
        let init_complete = Arc::new(AtomicBool::new(false));

        let shared = Arc::new(Shared {
            socket,
            state: Mutex::new(ConnectionState::new(&config)),
            queue: UniqueQueue::new(),
            events: events_tx,
            dispatch_tx,
            direct_tx,
            phase_tx,
            version: Arc::clone(&version),
            init_complete: Arc::clone(&init_complete),
            direct_pending: AtomicUsize::new(0),
            config,
        });

        let dispatcher = Dispatcher::new(registry, transfer, version, init_complete);
        let tasks = vec![
            tokio::spawn(receive_task(
                Arc::clone(&shared),
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(dispatch_task(
                Arc::clone(&shared),
                dispatch_rx,
                dispatcher,
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(send_task(
                Arc::clone(&shared),
                direct_rx,
                shutdown_tx.subscribe(),
            )),
            tokio::spawn(timer_task(Arc::clone(&shared), shutdown_tx.subscribe())),
        ];

        let client = AtemClient {
            shared,
            shutdown_tx,
            tasks: std::sync::Mutex::new(tasks),
            closed: AtomicBool::new(false),
        };
        if client.shared.config.auto_connect {
            client.connect().await?;
        }
        Ok((client, events_rx))
    }

    /// Starts the session handshake. Returns `false` when a connection
    /// attempt is already under way or the session is up.
    pub async fn connect(&self) -> Result<bool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AtemError::Closed);
        }
        {
            let mut state = self.shared.state.lock().await;
            match state.phase() {
                SessionPhase::Handshaking | SessionPhase::Established => return Ok(false),
                SessionPhase::Closed => return Err(AtemError::Closed),
                SessionPhase::Fresh | SessionPhase::TimedOut => {}
            }
            state.begin_handshake();
        }
        // The hello rides the control FIFO; the send worker serves it as
        // soon as the phase change wakes it.
        self.shared.phase_tx.send_replace(SessionPhase::Handshaking);
        if !self.shared.queue_direct(OutboundMessage::Handshake) {
            return Err(AtemError::Closed);
        }
        Ok(true)
    }

    /// Queues `command` for transmission under its collapse key. Bursts of
    /// updates to the same key transmit only the latest state.
    pub fn send_command<C: SerializeCommand>(&self, command: &C) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AtemError::Closed);
        }
        let version = self.connection_version().unwrap_or(ProtocolVersion::MINIMUM);
        let bytes = command.to_block(version).encode_to_bytes()?;
        self.shared.queue.enqueue(command.queue_key(), bytes);
        Ok(())
    }

    /// Appends `message` to the ready FIFO, bypassing collapse.
    pub fn direct_queue_message(&self, message: OutboundMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AtemError::Closed);
        }
        if !self.shared.queue_direct(message) {
            return Err(AtemError::Closed);
        }
        Ok(())
    }

    /// Whether any outbound work is still waiting for the wire.
    pub fn has_queued_outbound(&self) -> bool {
        !self.shared.queue.is_empty()
            || self.shared.direct_pending.load(Ordering::SeqCst) > 0
    }

    /// The dialect advertised by the peer, once its version command arrived.
    pub fn connection_version(&self) -> Option<ProtocolVersion> {
        ProtocolVersion::from_u32(self.shared.version.load(Ordering::Relaxed))
    }

    /// Whether the peer finished its initial state dump for this session.
    pub fn is_initialized(&self) -> bool {
        self.shared.init_complete.load(Ordering::Relaxed)
    }

    /// Transport counters for the current session.
    pub async fn stats(&self) -> ConnectionStats {
        self.shared.state.lock().await.stats()
    }

    /// Stops all worker tasks and waits for them. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.shared.state.lock().await.close();
        self.shared.phase_tx.send_replace(SessionPhase::Closed);
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self
                .tasks
                .lock()
                .expect("task handle lock poisoned");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for AtemClient {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(true);
        }
    }
}

/// Reads datagrams and feeds the connection state; decoded packets go to
/// protocol observers, ordered payloads to the dispatcher.
async fn receive_task(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = shared.socket.recv(&mut buf) => received,
        };
        let len = match received {
            Ok(len) => len,
            Err(e) => {
                if *shutdown.borrow() {
                    break;
                }
                debug!("transient socket receive error: {}", e);
                continue;
            }
        };
        let packet = match Packet::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("discarding malformed datagram: {}", e);
                continue;
            }
        };
        let _ = shared.events.send(AtemEvent::ReceivePacket(packet.clone()));

        let outcome = {
            let mut state = shared.state.lock().await;
            state.handle_incoming(&packet, Instant::now())
        };
        match outcome {
            Inbound::SessionEstablished => {
                // The grant is acked immediately, outside the coalescing
                // timer. Queued before the phase flip so the send worker
                // serves it ahead of any waiting data.
                let _ = shared.queue_direct(OutboundMessage::Ack);
                shared.phase_tx.send_replace(SessionPhase::Established);
                let _ = shared.dispatch_tx.send(DispatchItem::Connected);
            }
            Inbound::Deliver(payloads) => {
                for mut payload in payloads {
                    match CommandBlock::parse_all(&mut payload) {
                        Ok(blocks) if !blocks.is_empty() => {
                            let _ = shared.dispatch_tx.send(DispatchItem::Blocks(blocks));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("dropping payload with malformed command block: {}", e);
                        }
                    }
                }
            }
            Inbound::Ignored => {}
        }
    }
}

/// Decodes ordered blocks and delivers events; user code downstream of the
/// event channel never blocks this task's siblings.
async fn dispatch_task(
    shared: Arc<Shared>,
    mut items: mpsc::UnboundedReceiver<DispatchItem>,
    mut dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.changed() => break,
            item = items.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        match item {
            DispatchItem::Connected => {
                dispatcher.on_connected();
                let _ = shared.events.send(AtemEvent::Connected);
            }
            DispatchItem::Disconnected => {
                let _ = shared.events.send(AtemEvent::Disconnected);
            }
            DispatchItem::Blocks(blocks) => {
                let commands = dispatcher.decode_batch(blocks);
                if !commands.is_empty() {
                    let _ = shared.events.send(AtemEvent::Receive(commands));
                }
            }
        }
    }
    dispatcher.dispose();
}

enum Work {
    Direct(OutboundMessage),
    Keyed(Bytes),
}

/// Drains the ready FIFO and the collapsing queue into packed data packets.
///
/// Control directives are served in every session phase except the fully
/// parked ones; data payloads need an established session and are deferred,
/// in order, across a handshake or reconnect.
async fn send_task(
    shared: Arc<Shared>,
    mut direct_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut phase_rx = shared.phase_tx.subscribe();
    let mut deferred: VecDeque<Bytes> = VecDeque::new();
    'run: loop {
        // Park while there is no session attempt to serve.
        loop {
            match *phase_rx.borrow() {
                SessionPhase::Handshaking | SessionPhase::Established => break,
                SessionPhase::Closed => break 'run,
                SessionPhase::Fresh | SessionPhase::TimedOut => {}
            }
            tokio::select! {
                _ = shutdown.changed() => break 'run,
                changed = phase_rx.changed() => {
                    if changed.is_err() {
                        break 'run;
                    }
                }
            }
        }

        let established = *phase_rx.borrow() == SessionPhase::Established;

        if established {
            // Control directives already queued, notably the establishment
            // ack, go out ahead of any waiting data.
            while let Ok(message) = direct_rx.try_recv() {
                shared.direct_pending.fetch_sub(1, Ordering::SeqCst);
                handle_direct(&shared, message, &mut deferred, &shutdown).await;
            }
            // Then payloads deferred across the session drop, in order.
            while let Some(payload) = deferred.pop_front() {
                if let Some(payload) = send_data(&shared, payload, &shutdown).await {
                    deferred.push_front(payload);
                    break;
                }
            }
        }

        let work = if established {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break 'run,
                message = direct_rx.recv() => match message {
                    Some(message) => Work::Direct(message),
                    None => break 'run,
                },
                entry = shared.queue.dequeue() => Work::Keyed(entry.1),
            }
        } else {
            // Handshaking: only control traffic moves; keyed commands wait
            // for the session.
            tokio::select! {
                biased;
                _ = shutdown.changed() => break 'run,
                message = direct_rx.recv() => match message {
                    Some(message) => Work::Direct(message),
                    None => break 'run,
                },
                changed = phase_rx.changed() => {
                    if changed.is_err() {
                        break 'run;
                    }
                    continue;
                }
            }
        };

        match work {
            Work::Direct(message) => {
                shared.direct_pending.fetch_sub(1, Ordering::SeqCst);
                handle_direct(&shared, message, &mut deferred, &shutdown).await;
            }
            Work::Keyed(first) => {
                // Pack as many queued commands as fit under the MTU budget
                // into a single payload.
                let budget = shared.config.max_packet_size - HEADER_SIZE;
                let mut payload = BytesMut::with_capacity(budget);
                payload.extend_from_slice(&first);
                while let Some((_, next)) = shared
                    .queue
                    .try_dequeue_when(|bytes| payload.len() + bytes.len() <= budget)
                {
                    payload.extend_from_slice(&next);
                }
                if let Some(payload) = send_data(&shared, payload.freeze(), &shutdown).await {
                    deferred.push_back(payload);
                }
            }
        }
    }
}

/// Serves one control-FIFO message. Header-only directives are synthesized
/// from the current state and sent at once; command payloads respect the
/// order of anything already deferred.
async fn handle_direct(
    shared: &Shared,
    message: OutboundMessage,
    deferred: &mut VecDeque<Bytes>,
    shutdown: &watch::Receiver<bool>,
) {
    match message {
        OutboundMessage::Ack => {
            let ack = { shared.state.lock().await.ack_packet() };
            shared.send_packet(&ack).await;
        }
        OutboundMessage::Handshake => {
            let hello = { shared.state.lock().await.handshake_packet() };
            shared.send_packet(&hello).await;
        }
        OutboundMessage::Command(bytes) => {
            if deferred.is_empty() {
                if let Some(bytes) = send_data(shared, bytes, shutdown).await {
                    deferred.push_back(bytes);
                }
            } else {
                deferred.push_back(bytes);
            }
        }
    }
}

/// Assigns a packet id and transmits, waiting out a full in-flight window
/// with a brief yield. Returns the payload when no session can carry it
/// right now, so the caller can defer it instead of blocking the FIFO.
async fn send_data(shared: &Shared, payload: Bytes, shutdown: &watch::Receiver<bool>) -> Option<Bytes> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        match *shared.phase_tx.borrow() {
            SessionPhase::Established => {}
            SessionPhase::Closed => return None,
            _ => return Some(payload),
        }
        let packet = {
            let mut state = shared.state.lock().await;
            state.make_data_packet(payload.clone(), Instant::now())
        };
        match packet {
            Some(packet) => {
                shared.send_packet(&packet).await;
                return None;
            }
            // In-flight window is full; acks or retransmit deadlines will
            // open it again.
            None => tokio::time::sleep(Duration::from_micros(500)).await,
        }
    }
}

/// Drives ack coalescing, retransmit deadlines and the liveness clock.
async fn timer_task(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(shared.config.ack_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {}
        }
        let now = Instant::now();
        let (ack, resends, reconnect) = {
            let mut state = shared.state.lock().await;
            let ack = state.take_ack();
            let resends = state.due_retransmits(now);
            let reconnect = match state.check_liveness(now) {
                Liveness::Alive => None,
                // The hello goes out directly rather than through the FIFO:
                // a reconnect must never queue behind deferred data.
                Liveness::Reconnect { lost_session } => {
                    Some((state.handshake_packet(), lost_session))
                }
            };
            (ack, resends, reconnect)
        };

        if let Some(ack) = ack {
            shared.send_packet(&ack).await;
        }
        for resend in resends {
            trace!("retransmitting pkt {:#06x}", resend.header.pkt_id);
            shared.send_packet(&resend).await;
        }
        if let Some((handshake, lost_session)) = reconnect {
            shared.phase_tx.send_replace(SessionPhase::Handshaking);
            if lost_session {
                let _ = shared.dispatch_tx.send(DispatchItem::Disconnected);
            }
            debug!(
                "reconnecting with session id {:#06x}",
                handshake.header.session_id
            );
            shared.send_packet(&handshake).await;
        }
    }
}
