//! Channel configuration, shared engine state, and the public handle.
//!
//! [`RadioChannel`] is the crate's front door: it owns the supervisor task
//! and exposes `submit`, typed command helpers, and event subscription.
//! [`Shared`] is everything the submit path, the receive loop, and the
//! supervisor hand each other: the serial allocator, the pending registry,
//! the wake guard, the sequencer, the event bus, and the current link.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::body::{Body, DecodeFn, DecoderTable};
use crate::codec::PayloadWriter;
use crate::connection::{self, ConnectionState};
use crate::error::{ChannelError, CommandError};
use crate::events::{Event, EventBus, SubscriptionId};
use crate::guard::{NoopWake, ResourceGuard, WakeSource, DEFAULT_GUARD_TIMEOUT};
use crate::pending::{Completion, CompletionSink, PendingRegistry, PendingRequest};
use crate::protocol::wire_format::{self, VERSION_DISCONNECTED};
use crate::requests;
use crate::sequencer::{DtmfKind, DtmfSequencer, HeldCommand};
use crate::serial::SerialAllocator;
use crate::transport::SocketName;
use crate::writer::{WriterHandle, DEFAULT_QUEUE_DEPTH};

/// Pause between connection attempts while the daemon is away.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(4000);

/// Connection failures logged loudly before retrying goes silent.
pub const DEFAULT_VERBOSE_RETRY_ATTEMPTS: u32 = 8;

/// Everything tunable about one channel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Daemon socket to connect to.
    pub socket: SocketName,
    /// Largest incoming frame body accepted before the frame is skipped.
    pub max_incoming_frame: u32,
    /// Sleep between reconnect attempts.
    pub retry_interval: Duration,
    /// Attempts logged at warn level before retry logging goes quiet.
    pub verbose_retry_attempts: u32,
    /// Wake guard watchdog timeout.
    pub guard_timeout: Duration,
    /// Writer queue depth before submitters block.
    pub writer_queue_depth: usize,
}

impl ChannelConfig {
    /// Defaults for the given socket.
    pub fn new(socket: SocketName) -> Self {
        Self {
            socket,
            max_incoming_frame: wire_format::DEFAULT_MAX_INCOMING_BODY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            verbose_retry_attempts: DEFAULT_VERBOSE_RETRY_ATTEMPTS,
            guard_timeout: DEFAULT_GUARD_TIMEOUT,
            writer_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(SocketName::Abstract("rild".to_string()))
    }
}

/// Current writer attachment. `Connected` carries the live epoch's writer
/// handle; dropping it on teardown is what lets the writer task exit.
#[derive(Debug)]
pub(crate) enum LinkState {
    Disconnected,
    Connecting,
    Connected(WriterHandle),
}

/// State shared between the submit path, the receive loop, and the
/// connection supervisor.
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: ChannelConfig,
    pub serials: SerialAllocator,
    pub registry: PendingRegistry,
    pub guard: Arc<ResourceGuard>,
    pub sequencer: Mutex<DtmfSequencer>,
    pub bus: EventBus,
    pub decoders: DecoderTable,
    pub link: Mutex<LinkState>,
    pub negotiated_version: AtomicI32,
}

impl Shared {
    fn lock_link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_sequencer(&self) -> MutexGuard<'_, DtmfSequencer> {
        self.sequencer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_link(&self, state: LinkState) {
        *self.lock_link() = state;
    }

    pub(crate) fn status(&self) -> ConnectionState {
        match &*self.lock_link() {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::Connecting => ConnectionState::Connecting,
            LinkState::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Publishes the engine's own connection event carrying `version`
    /// (the daemon's announced version, or -1 on disconnect).
    pub(crate) fn publish_connection_changed(&self, version: i32) {
        self.negotiated_version.store(version, Ordering::Release);
        self.bus.publish(&Event {
            code: requests::events::CONNECTION_CHANGED,
            body: Body::Ints(vec![version]),
        });
    }

    /// Routes one command: sequenced opcodes go through the sequencer,
    /// everything else straight to the wire.
    pub(crate) async fn submit_with_sink(&self, request: i32, payload: Bytes, sink: CompletionSink) {
        if request == requests::DTMF_START {
            let held = HeldCommand::new(request, payload, sink);
            let next = self.lock_sequencer().start(held);
            self.dispatch_held_chain(next).await;
        } else if request == requests::DTMF_STOP {
            let held = HeldCommand::new(request, payload, sink);
            let next = self.lock_sequencer().stop(held);
            self.dispatch_held_chain(next).await;
        } else if requests::is_chld_class(request) {
            let held = HeldCommand::new(request, payload, sink);
            let next = self.lock_sequencer().submit_chld(held);
            self.dispatch_held_chain(next).await;
        } else {
            self.dispatch(request, payload, sink).await;
        }
    }

    /// Encodes and sends one command, registering it as pending.
    ///
    /// Returns true once the frame is queued to the writer. On any
    /// failure the sink has already been resolved and the guard balanced.
    pub(crate) async fn dispatch(&self, request: i32, payload: Bytes, sink: CompletionSink) -> bool {
        let serial = self.serials.next();

        let frame = match wire_format::encode_command(request, serial, &payload) {
            Ok(frame) => frame,
            Err(ChannelError::FrameTooLarge(size)) => {
                tracing::warn!(
                    "Refusing {}: {} byte frame exceeds the outbound cap",
                    requests::request_name(request),
                    size
                );
                sink.complete(Err(CommandError::FrameTooLarge(size)));
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to encode {}: {}", requests::request_name(request), e);
                sink.complete(Err(CommandError::RadioNotAvailable));
                return false;
            }
        };

        let writer = {
            let link = self.lock_link();
            match &*link {
                LinkState::Connected(writer) => writer.clone(),
                _ => {
                    drop(link);
                    tracing::debug!(
                        "Rejecting {}: not connected",
                        requests::request_name(request)
                    );
                    sink.complete(Err(CommandError::RadioNotAvailable));
                    return false;
                }
            }
        };

        // Acquire before registering so every entry the disconnect sweep
        // can drain is matched by exactly one hold.
        self.guard.acquire();

        if let Err(e) = self
            .registry
            .register(PendingRequest::new(serial, request, sink))
        {
            tracing::error!("Dropping {}: {}", requests::request_name(request), e);
            self.guard.release();
            return false;
        }

        tracing::debug!(
            "[SEND]> {} (serial {})",
            requests::request_name(request),
            serial
        );

        if writer.send(frame).await.is_err() {
            // The frame never reached the wire. Resolve it here unless
            // the disconnect sweep already did.
            if let Some(req) = self.registry.resolve(serial) {
                req.complete(Err(CommandError::RadioNotAvailable));
                self.guard.release();
            }
            return false;
        }

        true
    }

    /// Dispatches sequencer output, advancing past heads that fail to
    /// send so a dead link drains the queue instead of wedging it.
    async fn dispatch_held_chain(&self, mut next: Option<HeldCommand>) {
        while let Some(cmd) = next.take() {
            let HeldCommand {
                request,
                payload,
                sink,
            } = cmd;
            if self.dispatch(request, payload, sink).await {
                return;
            }
            next = self.sequencer_note(request, false);
        }
    }

    fn sequencer_note(&self, request: i32, ok: bool) -> Option<HeldCommand> {
        let mut seq = self.lock_sequencer();
        if request == requests::DTMF_START {
            seq.note_dtmf_complete(DtmfKind::Start, ok)
        } else if request == requests::DTMF_STOP {
            seq.note_dtmf_complete(DtmfKind::Stop, ok)
        } else if requests::is_chld_class(request) {
            seq.note_chld_complete()
        } else {
            None
        }
    }

    /// Tells the sequencer one of its commands resolved and dispatches
    /// whatever it releases next.
    pub(crate) async fn advance_sequencer(&self, request: i32, ok: bool) {
        let next = self.sequencer_note(request, ok);
        self.dispatch_held_chain(next).await;
    }

    /// Fails every outstanding and held command with radio-not-available
    /// and balances the guard. Runs after the link is marked down.
    pub(crate) fn fail_outstanding(&self) {
        self.lock_sequencer().fail_all();

        let drained = self.registry.drain_all();
        if !drained.is_empty() {
            tracing::warn!("Failing {} outstanding command(s)", drained.len());
        }
        for req in drained {
            req.complete(Err(CommandError::RadioNotAvailable));
            self.guard.release();
        }
    }
}

/// Configures and launches a [`RadioChannel`].
pub struct RadioChannelBuilder {
    config: ChannelConfig,
    decoders: DecoderTable,
    wake: Arc<dyn WakeSource>,
}

impl RadioChannelBuilder {
    /// Starts from defaults for the given socket.
    pub fn new(socket: SocketName) -> Self {
        Self {
            config: ChannelConfig::new(socket),
            decoders: DecoderTable::new(),
            wake: Arc::new(NoopWake),
        }
    }

    /// Starts from a fully specified configuration.
    pub fn from_config(config: ChannelConfig) -> Self {
        Self {
            config,
            decoders: DecoderTable::new(),
            wake: Arc::new(NoopWake),
        }
    }

    /// Caps incoming frame bodies; larger frames are skipped.
    pub fn max_incoming_frame(mut self, bytes: u32) -> Self {
        self.config.max_incoming_frame = bytes;
        self
    }

    /// Sets the pause between reconnect attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Sets how many failed attempts are logged before going quiet.
    pub fn verbose_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.verbose_retry_attempts = attempts;
        self
    }

    /// Sets the wake guard watchdog timeout.
    pub fn guard_timeout(mut self, timeout: Duration) -> Self {
        self.config.guard_timeout = timeout;
        self
    }

    /// Sets the writer queue depth.
    pub fn writer_queue_depth(mut self, depth: usize) -> Self {
        self.config.writer_queue_depth = depth;
        self
    }

    /// Installs the platform wake hook held while commands are in flight.
    pub fn wake_source(mut self, source: Arc<dyn WakeSource>) -> Self {
        self.wake = source;
        self
    }

    /// Adds or replaces the reply decoder for `request`.
    pub fn reply_decoder(mut self, request: i32, decode: DecodeFn) -> Self {
        self.decoders.register_reply(request, decode);
        self
    }

    /// Adds or replaces the event decoder for `event`.
    pub fn event_decoder(mut self, event: i32, decode: DecodeFn) -> Self {
        self.decoders.register_event(event, decode);
        self
    }

    /// Launches the supervisor and returns the channel handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RadioChannel {
        let guard_timeout = self.config.guard_timeout;
        let shared = Arc::new(Shared {
            serials: SerialAllocator::new(),
            registry: PendingRegistry::new(),
            guard: ResourceGuard::new(self.wake, guard_timeout),
            sequencer: Mutex::new(DtmfSequencer::new()),
            bus: EventBus::new(),
            decoders: self.decoders,
            link: Mutex::new(LinkState::Disconnected),
            negotiated_version: AtomicI32::new(VERSION_DISCONNECTED),
            config: self.config,
        });

        let supervisor = tokio::spawn(connection::run(shared.clone()));
        RadioChannel { shared, supervisor }
    }
}

/// Handle to one daemon connection.
///
/// Cheap operations only; the heavy lifting happens on the supervisor,
/// writer, and receive tasks the handle owns. Dropping the handle aborts
/// the supervisor; prefer [`shutdown`](RadioChannel::shutdown) when
/// outstanding commands should be failed deterministically.
#[derive(Debug)]
pub struct RadioChannel {
    shared: Arc<Shared>,
    supervisor: JoinHandle<()>,
}

impl RadioChannel {
    /// Builder entry point.
    pub fn builder(socket: SocketName) -> RadioChannelBuilder {
        RadioChannelBuilder::new(socket)
    }

    /// Submits a raw command. The payload is the command-specific fields
    /// only; framing, serial allocation, and correlation happen here.
    ///
    /// The returned [`Completion`] resolves with the decoded reply body
    /// or the command's failure.
    pub async fn submit(&self, request: i32, payload: Bytes) -> Completion {
        let (sink, completion) = CompletionSink::pair();
        self.shared.submit_with_sink(request, payload, sink).await;
        completion
    }

    /// Subscribes to an event code. See [`EventBus::subscribe`].
    pub fn subscribe<F>(&self, code: i32, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(code, handler)
    }

    /// Removes an event subscription.
    pub fn unsubscribe(&self, code: i32, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(code, id)
    }

    /// Where the supervisor currently stands with the daemon.
    pub fn connection_status(&self) -> ConnectionState {
        self.shared.status()
    }

    /// Version the daemon announced on connect, or -1 while disconnected.
    pub fn negotiated_version(&self) -> i32 {
        self.shared.negotiated_version.load(Ordering::Acquire)
    }

    /// Commands dispatched but not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Replies received whose serial matched nothing.
    pub fn spurious_replies(&self) -> u64 {
        self.shared.registry.spurious_count()
    }

    /// True while the wake guard is held.
    pub fn guard_held(&self) -> bool {
        self.shared.guard.held()
    }

    /// Stops the supervisor and fails everything outstanding.
    pub async fn shutdown(mut self) {
        self.supervisor.abort();
        let _ = (&mut self.supervisor).await;
        self.shared.set_link(LinkState::Disconnected);
        self.shared.fail_outstanding();
    }
}

impl Drop for RadioChannel {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

/// Typed command helpers over [`submit`](RadioChannel::submit).
impl RadioChannel {
    /// Originates a voice call. `clir` is the caller-line restriction
    /// mode (0 follows the subscription default).
    pub async fn dial(&self, address: &str, clir: i32) -> Completion {
        let payload = PayloadWriter::new().put_str(address).put_i32(clir).finish();
        self.submit(requests::DIAL, payload).await
    }

    /// Hangs up the call at `index` in the current call list.
    pub async fn hangup(&self, index: i32) -> Completion {
        let payload = PayloadWriter::new().put_i32_list(&[index]).finish();
        self.submit(requests::HANGUP, payload).await
    }

    /// Answers the ringing call.
    pub async fn answer(&self) -> Completion {
        self.submit(requests::ANSWER, Bytes::new()).await
    }

    /// Powers the radio on or off.
    pub async fn radio_power(&self, on: bool) -> Completion {
        let payload = PayloadWriter::new().put_i32_list(&[i32::from(on)]).finish();
        self.submit(requests::RADIO_POWER, payload).await
    }

    /// Reads the device identity.
    pub async fn get_imei(&self) -> Completion {
        self.submit(requests::GET_IMEI, Bytes::new()).await
    }

    /// Reads the subscriber identity.
    pub async fn get_imsi(&self) -> Completion {
        self.submit(requests::GET_IMSI, Bytes::new()).await
    }

    /// Reads the baseband firmware version.
    pub async fn baseband_version(&self) -> Completion {
        self.submit(requests::BASEBAND_VERSION, Bytes::new()).await
    }

    /// Polls signal strength.
    pub async fn signal_strength(&self) -> Completion {
        self.submit(requests::SIGNAL_STRENGTH, Bytes::new()).await
    }

    /// Queries SIM status. The reply body is opcode-specific and left
    /// raw.
    pub async fn get_sim_status(&self) -> Completion {
        self.submit(requests::GET_SIM_STATUS, Bytes::new()).await
    }

    /// Lists current calls. The reply body is opcode-specific and left
    /// raw.
    pub async fn get_current_calls(&self) -> Completion {
        self.submit(requests::GET_CURRENT_CALLS, Bytes::new()).await
    }

    /// Asks why the last call ended.
    pub async fn last_call_fail_cause(&self) -> Completion {
        self.submit(requests::LAST_CALL_FAIL_CAUSE, Bytes::new())
            .await
    }

    /// Sends one DTMF tone in the active call.
    pub async fn send_dtmf(&self, tone: char) -> Completion {
        let payload = PayloadWriter::new().put_str(&tone.to_string()).finish();
        self.submit(requests::DTMF, payload).await
    }

    /// Begins playing `tone`. Serialized against other DTMF and
    /// supervision commands; a duplicate start is cancelled.
    pub async fn start_dtmf(&self, tone: char) -> Completion {
        let payload = PayloadWriter::new().put_str(&tone.to_string()).finish();
        self.submit(requests::DTMF_START, payload).await
    }

    /// Stops the playing tone.
    pub async fn stop_dtmf(&self) -> Completion {
        self.submit(requests::DTMF_STOP, Bytes::new()).await
    }

    /// Swaps the waiting or holding call with the active one.
    pub async fn switch_holding_and_active(&self) -> Completion {
        self.submit(requests::SWITCH_WAITING_OR_HOLDING_AND_ACTIVE, Bytes::new())
            .await
    }

    /// Merges the active and held calls into a conference.
    pub async fn conference(&self) -> Completion {
        self.submit(requests::CONFERENCE, Bytes::new()).await
    }

    /// Rejects a waiting call (user determined user busy).
    pub async fn udub(&self) -> Completion {
        self.submit(requests::UDUB, Bytes::new()).await
    }

    /// Hangs up waiting or background calls.
    pub async fn hangup_waiting_or_background(&self) -> Completion {
        self.submit(requests::HANGUP_WAITING_OR_BACKGROUND, Bytes::new())
            .await
    }

    /// Hangs up the foreground call and resumes the background one.
    pub async fn hangup_foreground_resume_background(&self) -> Completion {
        self.submit(requests::HANGUP_FOREGROUND_RESUME_BACKGROUND, Bytes::new())
            .await
    }

    /// Splits the call at `index` out of the conference.
    pub async fn separate_connection(&self, index: i32) -> Completion {
        let payload = PayloadWriter::new().put_i32_list(&[index]).finish();
        self.submit(requests::SEPARATE_CONNECTION, payload).await
    }

    /// Connects the held call to the other party and drops out.
    pub async fn explicit_call_transfer(&self) -> Completion {
        self.submit(requests::EXPLICIT_CALL_TRANSFER, Bytes::new())
            .await
    }
}
