//! The session synchronization channel.
//!
//! [`SessionChannel::spawn`] starts one driver task per session. The task owns
//! the connection, the [`SessionClock`] and the local language selection, and
//! runs every timer of the channel:
//!
//! - outgoing sampling: dirty signals are coalesced into one
//!   [`ChannelEvent::ReportDue`] per window, answered by the consumer with
//!   [`SessionChannel::send_report`]
//! - incoming hold: payloads wait until the local user has been quiet for the
//!   silence window, and only the latest one is released
//! - heartbeat: a ping per interval; a stale connection is torn down and
//!   re-established at most once per cooldown
//!
//! Transport failures stop here. They are logged and turned into
//! [`ChannelState`] transitions, never into errors for the consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use n0_future::StreamExt;
use n0_future::boxed::BoxStream;
use n0_future::stream;
use tandem_common::{
    Connection, IncomingMessage, OutgoingMessage, RemoteUpdate, SessionKey, StateReport,
    SyncConfig, Transport,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant as TokioInstant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::clock::SessionClock;
use crate::coordinator::ChannelState;
use crate::error::SyncError;
use crate::language::LanguageArbiter;

/// Events delivered to the channel's consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Local changes are pending; build a report and pass it to `send_report`.
    ReportDue,
    /// A released inbound payload.
    Remote(RemoteUpdate),
    /// The connection went stale and is being re-established.
    Reconnecting,
    StateChanged(ChannelState),
}

enum Command {
    MarkDirty,
    Report(StateReport),
    SetLanguage(String),
    InputText(String),
    TriggerExecution,
    CompleteExecution { stdout: String, stderr: String },
}

/// Handle to a running session channel.
///
/// Dropping the handle shuts the channel down.
pub struct SessionChannel {
    key: SessionKey,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    reconnects: Arc<AtomicU32>,
    cancel: CancellationToken,
}

/// Receiving side of a session channel.
pub struct ChannelEvents {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl ChannelEvents {
    /// Wait for the next event. `None` once the channel has shut down.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> BoxStream<ChannelEvent> {
        Box::pin(stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }
}

impl SessionChannel {
    /// Start a channel for `key`. Must be called inside a tokio runtime.
    pub fn spawn<T: Transport>(
        transport: T,
        key: SessionKey,
        config: SyncConfig,
    ) -> (SessionChannel, ChannelEvents) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let reconnects = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport,
            key: key.clone(),
            clock: SessionClock::new(now()),
            language: LanguageArbiter::new(config.language_grace()),
            config,
            connection: None,
            dirty: false,
            held: None,
            events: event_tx,
            state: state_tx,
            reconnects: reconnects.clone(),
        };
        tokio::spawn(driver.run(command_rx, cancel.clone()));

        let channel = SessionChannel {
            key,
            commands: command_tx,
            state: state_rx,
            reconnects,
            cancel,
        };
        (channel, ChannelEvents { rx: event_rx })
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.key
    }

    /// Signal a local edit, caret move or selection change.
    pub fn mark_dirty(&self) -> Result<(), SyncError> {
        self.command(Command::MarkDirty)
    }

    /// Send a state report built by the document glue.
    pub fn send_report(&self, report: StateReport) -> Result<(), SyncError> {
        self.command(Command::Report(report))
    }

    /// The local user picked a language. A report is requested right away.
    pub fn set_language(&self, language: impl Into<String>) -> Result<(), SyncError> {
        self.command(Command::SetLanguage(language.into()))
    }

    /// Share the program input text. Counts as a local edit.
    pub fn update_input_text(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.command(Command::InputText(text.into()))
    }

    pub fn trigger_execution(&self) -> Result<(), SyncError> {
        self.command(Command::TriggerExecution)
    }

    pub fn complete_execution(
        &self,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.command(Command::CompleteExecution {
            stdout: stdout.into(),
            stderr: stderr.into(),
        })
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Reconnects triggered by the heartbeat so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }

    /// Stop the channel: timers, connection and pending payloads.
    ///
    /// Safe to call any number of times. Does not wait for the task; the
    /// event receiver yields `None` once it is gone.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!(key = %self.key, "shutting down session channel");
        }
        self.cancel.cancel();
    }

    fn command(&self, command: Command) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::ChannelClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| SyncError::ChannelClosed)
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn now() -> Instant {
    TokioInstant::now().into_std()
}

/// Next message from the live connection. Pends forever while disconnected.
async fn next_incoming(connection: &mut Option<Connection>) -> Option<IncomingMessage> {
    match connection {
        Some(conn) => conn.events.next().await,
        None => std::future::pending().await,
    }
}

struct Driver<T> {
    transport: T,
    key: SessionKey,
    config: SyncConfig,
    clock: SessionClock,
    language: LanguageArbiter,
    connection: Option<Connection>,
    dirty: bool,
    /// Latest inbound payload waiting for the silence window.
    held: Option<IncomingMessage>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: watch::Sender<ChannelState>,
    reconnects: Arc<AtomicU32>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self, commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => debug!(key = %self.key, "session channel cancelled"),
            _ = self.run_loop(commands) => debug!(key = %self.key, "session channel consumer gone"),
        }
        self.connection = None;
        self.held = None;
        self.set_state(ChannelState::Disconnected);
        info!(key = %self.key, "session channel stopped");
    }

    async fn run_loop(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.connect().await;

        let start = TokioInstant::now();
        let mut sample = interval_at(start + self.config.outgoing_sample(), self.config.outgoing_sample());
        let mut poll = interval_at(start + self.config.incoming_poll(), self.config.incoming_poll());
        let mut ping = interval_at(start + self.config.ping_interval(), self.config.ping_interval());
        for timer in [&mut sample, &mut poll, &mut ping] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => return,
                },
                message = next_incoming(&mut self.connection) => self.handle_incoming(message),
                _ = sample.tick() => self.flush_dirty(),
                _ = poll.tick() => self.release_held(),
                _ = ping.tick() => self.heartbeat().await,
            }
            if self.events.is_closed() {
                return;
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = now();
        match command {
            Command::MarkDirty => self.dirty = true,
            Command::Report(report) => {
                self.dirty = false;
                if report.base_text != report.new_text {
                    self.clock.record_local_edit(now);
                }
                let language = self.language.resolve_outgoing(&self.clock, now);
                let message = OutgoingMessage::report(&self.key.user_id, report, language);
                if self.send(message) {
                    metrics::counter!("tandem_reports_sent_total").increment(1);
                }
            }
            Command::SetLanguage(language) => {
                debug!(%language, "local language change");
                self.language.select_local(language, &mut self.clock, now);
                self.dirty = false;
                self.emit(ChannelEvent::ReportDue);
            }
            Command::InputText(text) => {
                self.clock.record_local_edit(now);
                self.send(OutgoingMessage::input_text(&self.key.user_id, text));
            }
            Command::TriggerExecution => {
                self.send(OutgoingMessage::execution_started(&self.key.user_id));
            }
            Command::CompleteExecution { stdout, stderr } => {
                self.send(OutgoingMessage::execution_completed(
                    &self.key.user_id,
                    stdout,
                    stderr,
                ));
            }
        }
    }

    fn handle_incoming(&mut self, message: Option<IncomingMessage>) {
        let Some(message) = message else {
            info!(key = %self.key, "session connection lost");
            self.connection = None;
            self.set_state(ChannelState::Disconnected);
            return;
        };
        if message.ping {
            trace!("pong");
            self.clock.record_pong(now());
            return;
        }
        if self.held.replace(message).is_some() {
            trace!("held payload superseded");
        }
    }

    fn flush_dirty(&mut self) {
        if std::mem::take(&mut self.dirty) {
            self.emit(ChannelEvent::ReportDue);
        }
    }

    fn release_held(&mut self) {
        if self.held.is_none() {
            return;
        }
        let now = now();
        if !self
            .clock
            .silence_elapsed(now, self.config.silence_after_editing())
        {
            return;
        }
        let Some(message) = self.held.take() else {
            return;
        };
        let mut update = RemoteUpdate::from(message);
        update.language = self
            .language
            .observe_remote(update.language.take(), &self.clock, now);
        trace!(has_text = update.text.is_some(), users = update.users.len(), "releasing payload");
        self.emit(ChannelEvent::Remote(update));
    }

    async fn heartbeat(&mut self) {
        let now = now();
        if self.clock.should_reconnect(
            now,
            self.config.pong_threshold(),
            self.config.reconnect_cooldown(),
        ) {
            self.reconnect(now).await;
        }
        if self.connection.is_some() {
            self.send(OutgoingMessage::ping());
        }
    }

    async fn reconnect(&mut self, now: Instant) {
        self.clock.record_reconnect(now);
        let attempt = self.clock.reconnect_attempts();
        self.reconnects.store(attempt, Ordering::SeqCst);
        metrics::counter!("tandem_reconnects_total").increment(1);
        info!(key = %self.key, attempt, "no pong from server, reconnecting");

        self.emit(ChannelEvent::Reconnecting);
        self.connection = None;
        self.set_state(ChannelState::Disconnected);
        self.connect().await;
    }

    async fn connect(&mut self) {
        self.set_state(ChannelState::Connecting);
        match self.transport.connect(&self.key).await {
            Ok(connection) => {
                info!(key = %self.key, "session channel connected");
                self.connection = Some(connection);
                self.set_state(ChannelState::Connected);
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "session channel connect failed");
                self.set_state(ChannelState::Disconnected);
            }
        }
    }

    /// Send on the live connection. Returns false if the message was dropped.
    fn send(&self, message: OutgoingMessage) -> bool {
        let Some(connection) = &self.connection else {
            debug!(report = message.is_report(), "not connected, dropping outgoing message");
            return false;
        };
        match connection.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to queue outgoing message");
                false
            }
        }
    }

    fn set_state(&mut self, state: ChannelState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.emit(ChannelEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            trace!("channel events receiver dropped");
        }
    }
}
