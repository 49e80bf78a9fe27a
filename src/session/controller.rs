//! The session state machine.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{
    inbox, InboxReceiver, InboxSender, PlaybackNotifier, ReleaseReport, SessionCounters,
    SessionInput, SessionResources, SessionState, SessionStats, SessionStatus, StatusPublisher,
    TransportEvents,
};
use crate::audio::{AudioBackend, InputFormat};
use crate::chunk::{EncodedAudioChunk, PlaybackId};
use crate::config::{Language, SessionConfig};
use crate::event::EventCallback;
use crate::pipeline::{
    spawn_capture_bridge, spawn_decoder, CaptureConfig, DecodeJob, DecodeOutcome, DecodeTicket,
    Framer, InterruptionHandler,
};
use crate::transport::{
    ServerMessage, SessionHandle, SetupMessage, Submitted, Transport, TransportEvent,
    TransportLink,
};
use crate::{SessionEvent, VoiceSessionError};

/// Log a progress line every this many sent chunks.
const DEBUG_EVERY: u64 = 50;

/// WebSocket close code for a normal closure.
const NORMAL_CLOSURE: u16 = 1000;

/// Owns one voice session: its lifecycle, devices, channel and playback.
///
/// The controller is the single source of truth for the session. Every
/// producer (capture, transport, decoder, speaker) reports into its inbox,
/// and all reactions run on whichever task drives the controller, one input
/// at a time.
///
/// Hardware streams are not `Send`, so the controller isn't either: drive it
/// with [`run()`](SessionController::run) on the task that created it and
/// use a [`SessionControl`] to stop it from elsewhere.
///
/// # Lifecycle
///
/// 1. Created by [`LiveVoiceBuilder::build()`](crate::LiveVoiceBuilder::build) in `Idle`
/// 2. [`connect()`](SessionController::connect) opens the speaker, the
///    microphone and the channel, then streams audio (`Active`)
/// 3. The session ends on [`disconnect()`](SessionController::disconnect),
///    a remote close (`Closed`) or an error (`Failed`)
/// 4. Dropping the controller also ends the session
///
/// Every way out releases all resources exactly once, before the terminal
/// state is published.
///
/// # Example
///
/// ```ignore
/// use live_voice::{Language, LiveVoice, SessionConfig};
///
/// let mut session = LiveVoice::builder()
///     .config(SessionConfig::default().with_api_key(key))
///     .on_event(|e| tracing::debug!(?e, "session event"))
///     .build()?;
///
/// let control = session.control();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     control.disconnect();
/// });
///
/// session.connect(Language::English).await?;
/// session.run().await;
/// ```
pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    backend: Arc<dyn AudioBackend>,
    event_callback: Option<EventCallback>,
    state: SessionState,
    language: Option<Language>,
    status: StatusPublisher,
    counters: Arc<SessionCounters>,
    inbox_tx: InboxSender,
    inbox_rx: InboxReceiver,
    /// Inputs that arrived while the channel was opening.
    deferred: VecDeque<SessionInput>,
    resources: SessionResources,
    interruption: InterruptionHandler,
    next_decode: u64,
}

impl SessionController {
    pub(crate) fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn AudioBackend>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = inbox();
        Self {
            config,
            transport,
            backend,
            event_callback,
            state: SessionState::Idle,
            language: None,
            status: StatusPublisher::new(),
            counters: Arc::new(SessionCounters::default()),
            inbox_tx,
            inbox_rx,
            deferred: VecDeque::new(),
            resources: SessionResources::default(),
            interruption: InterruptionHandler::new(),
            next_decode: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current observable status.
    pub fn status(&self) -> SessionStatus {
        self.status.current()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Spoken language, fixed at connect time.
    pub fn language(&self) -> Option<Language> {
        self.language
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns `true` while assistant audio is scheduled or playing.
    pub fn is_speaking(&self) -> bool {
        self.resources.scheduler.is_speaking()
    }

    /// Number of playback buffers scheduled or playing.
    pub fn active_playback(&self) -> usize {
        self.resources.scheduler.active_len()
    }

    /// Output clock offset the next buffer is queued at.
    pub fn next_start(&self) -> Duration {
        self.resources.scheduler.next_start()
    }

    /// Returns a cloneable handle for stopping the session from another task.
    pub fn control(&self) -> SessionControl {
        SessionControl {
            inbox: self.inbox_tx.clone(),
            status: self.status.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Starts the session.
    ///
    /// Opens the speaker, the microphone and the channel (sending the setup
    /// handshake for `language`), then starts streaming. Returns once the
    /// session is `Active`; inbound audio is handled by
    /// [`run()`](SessionController::run).
    ///
    /// A [`SessionControl::disconnect()`] that arrives while the channel is
    /// opening abandons the open, releases the devices and returns `Ok` with
    /// the session `Closed`.
    ///
    /// With a connect timeout configured, the endpoint must also acknowledge
    /// the setup within that time once the session is `Active`, or the
    /// session fails with [`VoiceSessionError::ConnectTimeout`].
    ///
    /// # Errors
    ///
    /// - [`VoiceSessionError::InvalidState`] unless the session is `Idle`
    /// - [`VoiceSessionError::InvalidConfig`] if the configuration is invalid
    ///   (the session stays `Idle`)
    /// - [`VoiceSessionError::PermissionDenied`] if microphone access was refused
    /// - [`VoiceSessionError::ConnectionFailure`] or
    ///   [`VoiceSessionError::ConnectTimeout`] if the channel didn't open
    /// - a device error if the speaker or microphone couldn't be opened
    ///
    /// On every error except the first two the session is `Failed` and all
    /// acquired resources have been released.
    pub async fn connect(&mut self, language: Language) -> Result<(), VoiceSessionError> {
        if self.state != SessionState::Idle {
            return Err(VoiceSessionError::InvalidState {
                action: "connect",
                state: self.state,
            });
        }
        self.config.validate()?;

        self.language = Some(language);
        self.transition(SessionState::Connecting);
        tracing::info!(language = %language, model = %self.config.model, "Connecting voice session");

        let notifier = PlaybackNotifier::new(self.inbox_tx.clone());
        match self
            .backend
            .open_output(self.config.output_device.as_deref(), notifier)
        {
            Ok(output) => self.resources.output = Some(output),
            Err(e) => return Err(self.fail(e)),
        }

        let format = match self.backend.open_input(
            self.config.input_device.as_deref(),
            self.config.capture_buffer_duration,
        ) {
            Ok(input) => {
                let format = input.format();
                self.resources.input = Some(input);
                format
            }
            Err(e) => return Err(self.fail(e)),
        };

        let link = match self.open_channel(language).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                tracing::info!("Disconnect requested while connecting");
                self.disconnect();
                return Ok(());
            }
            Err(e) => return Err(self.fail(e)),
        };
        self.resources.channel = Some(SessionHandle::new(link));
        self.transition(SessionState::Active);

        if let Err(e) = self.start_streaming(format) {
            return Err(self.fail(e));
        }
        self.arm_ready_deadline();
        Ok(())
    }

    /// Opens the channel, watching the inbox for a disconnect meanwhile.
    ///
    /// Returns `Ok(None)` if a disconnect was requested first. Other inputs
    /// are kept for [`run()`](SessionController::run).
    async fn open_channel(
        &mut self,
        language: Language,
    ) -> Result<Option<TransportLink>, VoiceSessionError> {
        let setup = SetupMessage::new(&self.config, language);
        let events = TransportEvents::new(self.inbox_tx.clone());
        let transport = Arc::clone(&self.transport);
        let limit = self.config.connect_timeout;
        let open = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, transport.open(setup, events))
                    .await
                    .unwrap_or(Err(VoiceSessionError::ConnectTimeout(limit))),
                None => transport.open(setup, events).await,
            }
        };
        tokio::pin!(open);

        loop {
            let input = tokio::select! {
                biased;
                input = self.inbox_rx.recv() => input,
                result = &mut open => return result.map(Some),
            };
            match input {
                Some(SessionInput::Disconnect) => return Ok(None),
                Some(other) => self.deferred.push_back(other),
                None => return open.await.map(Some),
            }
        }
    }

    fn arm_ready_deadline(&mut self) {
        let Some(limit) = self.config.connect_timeout else {
            return;
        };
        let inbox = self.inbox_tx.clone();
        self.resources.ready_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = inbox.send(SessionInput::ReadyDeadline(limit));
        }));
    }

    fn start_streaming(&mut self, format: InputFormat) -> Result<(), VoiceSessionError> {
        self.resources.decoder = Some(spawn_decoder(
            self.inbox_tx.clone(),
            self.config.output_sample_rate,
        ));

        let consumer = match self.resources.input.as_mut() {
            Some(input) => input.start()?,
            None => return Err(VoiceSessionError::backend("input device is not open")),
        };
        let framer = Framer::new(
            consumer,
            format,
            self.config.input_sample_rate,
            self.config.frame_size,
        );
        let capture_config = CaptureConfig {
            mime_type: self.config.input_mime_type(),
            poll_interval: self.config.capture_poll_interval,
        };
        self.resources.capture = Some(spawn_capture_bridge(
            framer,
            capture_config,
            self.inbox_tx.clone(),
            Arc::clone(&self.counters),
            self.event_callback.clone(),
        ));

        tracing::info!(
            "Capture started: device={}Hz/{}ch, target={}Hz, frame={} samples",
            format.sample_rate,
            format.channels,
            self.config.input_sample_rate,
            self.config.frame_size
        );
        self.emit(SessionEvent::CaptureStarted {
            device_sample_rate: format.sample_rate,
            device_channels: format.channels,
        });
        Ok(())
    }

    /// Ends the session and releases everything it holds.
    ///
    /// Takes effect immediately: capture and playback stop, queued audio is
    /// discarded and no network round trip is awaited. Idempotent and
    /// callable in any state; the session always ends `Closed`. A session
    /// that had failed keeps its error in the status.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Closed {
            tracing::info!(state = %self.state, "Disconnecting voice session");
        }
        self.release();
        self.transition(SessionState::Closed);
    }

    /// Processes session inputs until the session ends.
    pub async fn run(&mut self) {
        while !self.state.is_terminal() {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Waits for and processes one input.
    ///
    /// Returns `false` if the inbox is closed.
    pub async fn process_next(&mut self) -> bool {
        if let Some(input) = self.deferred.pop_front() {
            self.handle(input);
            return true;
        }
        match self.inbox_rx.recv().await {
            Some(input) => {
                self.handle(input);
                true
            }
            None => false,
        }
    }

    /// Processes every input that is already waiting, without blocking.
    ///
    /// Returns how many inputs were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(input) = self.deferred.pop_front() {
            self.handle(input);
            handled += 1;
        }
        while let Ok(input) = self.inbox_rx.try_recv() {
            self.handle(input);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, input: SessionInput) {
        if self.state.is_terminal() {
            if let SessionInput::Disconnect = input {
                self.disconnect();
            }
            // Late reports from released resources
            return;
        }

        match input {
            SessionInput::Disconnect => self.disconnect(),
            SessionInput::Transport(event) => self.on_transport(event),
            SessionInput::Captured(chunk) => self.on_captured(chunk),
            SessionInput::Decoded(outcome) => self.on_decoded(outcome),
            SessionInput::PlaybackFinished(id) => self.on_playback_finished(id),
            SessionInput::ReadyDeadline(limit) => self.on_ready_deadline(limit),
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => self.on_ready(),
            TransportEvent::Message(message) => self.on_message(&message),
            TransportEvent::Closed { code, reason } => {
                if code.is_some_and(|c| c != NORMAL_CLOSURE) {
                    tracing::warn!(?code, %reason, "Channel closed abnormally");
                } else {
                    tracing::info!(?code, %reason, "Channel closed");
                }
                if self.state == SessionState::Connecting {
                    let err = VoiceSessionError::connection_failure(format!(
                        "channel closed before the session was active: {reason}"
                    ));
                    self.fail(err);
                    return;
                }
                if let Some(code) = code.filter(|&c| c != NORMAL_CLOSURE) {
                    self.status
                        .set_error(Some(format!("channel closed with code {code}: {reason}")));
                }
                self.release();
                self.transition(SessionState::Closed);
            }
            TransportEvent::Error { reason } => {
                let err = if self.state == SessionState::Active {
                    VoiceSessionError::mid_session(reason)
                } else {
                    VoiceSessionError::connection_failure(reason)
                };
                self.fail(err);
            }
        }
    }

    fn on_ready(&mut self) {
        let Some(channel) = self.resources.channel.as_mut() else {
            return;
        };
        if channel.is_ready() {
            return;
        }
        if let Some(timer) = self.resources.ready_timer.take() {
            timer.abort();
        }
        match channel.mark_ready() {
            Ok(flushed) => {
                for _ in 0..flushed {
                    SessionCounters::bump(&self.counters.chunks_sent);
                }
                tracing::info!(flushed, "Channel ready");
                self.emit(SessionEvent::ChannelReady { flushed });
            }
            Err(e) => {
                self.fail(e);
            }
        }
    }

    fn on_ready_deadline(&mut self, limit: Duration) {
        let ready = self
            .resources
            .channel
            .as_ref()
            .is_some_and(SessionHandle::is_ready);
        if ready || self.state != SessionState::Active {
            return;
        }
        tracing::warn!(?limit, "Endpoint never acknowledged the setup");
        self.fail(VoiceSessionError::ConnectTimeout(limit));
    }

    fn on_message(&mut self, message: &ServerMessage) {
        for blob in message.audio_parts() {
            let ticket = DecodeTicket {
                generation: self.interruption.generation(),
                sequence: self.next_decode,
            };
            self.next_decode += 1;
            let job = DecodeJob {
                ticket,
                data: blob.data.clone(),
                mime_type: blob.mime_type.clone(),
            };
            let submitted = self
                .resources
                .decoder
                .as_ref()
                .is_some_and(|decoder| decoder.submit(job));
            if !submitted {
                tracing::debug!(sequence = ticket.sequence, "Decoder not running, dropping audio");
            }
        }

        if message.is_interrupted() {
            self.on_interrupted();
        }

        if message.is_turn_complete() {
            tracing::debug!("Model turn complete");
            self.emit(SessionEvent::TurnComplete);
        }

        if let Some(go_away) = &message.go_away {
            tracing::warn!(time_left = ?go_away.time_left, "Endpoint will close the channel soon");
            self.emit(SessionEvent::GoAway {
                time_left: go_away.time_left.clone(),
            });
        }
    }

    fn on_interrupted(&mut self) {
        let stopped = match self.resources.output.as_mut() {
            Some(output) => self
                .interruption
                .interrupt(&mut self.resources.scheduler, output.as_mut()),
            None => 0,
        };
        SessionCounters::bump(&self.counters.interruptions);
        self.status.set_speaking(false);

        tracing::info!(
            stopped,
            generation = self.interruption.generation(),
            "Playback interrupted"
        );
        self.emit(SessionEvent::Interrupted { stopped });
    }

    fn on_captured(&mut self, chunk: EncodedAudioChunk) {
        if self.state != SessionState::Active {
            return;
        }
        let Some(channel) = self.resources.channel.as_mut() else {
            return;
        };
        if channel.is_closed() {
            return;
        }

        let sequence = chunk.sequence;
        match channel.submit(chunk) {
            Ok(Submitted::Sent) => {
                let sent = SessionCounters::bump(&self.counters.chunks_sent) + 1;
                if sent % DEBUG_EVERY == 0 {
                    tracing::debug!(sequence, "Sent chunk #{}", sent);
                }
            }
            Ok(Submitted::Queued) => {
                SessionCounters::bump(&self.counters.chunks_queued);
                tracing::trace!(sequence, queued = channel.queued(), "Channel not ready, queued chunk");
            }
            Err(e) => {
                // The transport reports its own failure; this chunk is lost with it
                tracing::debug!(sequence, "Could not send chunk: {}", e);
            }
        }
    }

    fn on_decoded(&mut self, outcome: DecodeOutcome) {
        let DecodeOutcome { ticket, result } = outcome;

        if self.interruption.is_stale(ticket.generation) {
            SessionCounters::bump(&self.counters.stale_buffers);
            tracing::debug!(
                generation = ticket.generation,
                sequence = ticket.sequence,
                "Discarding audio decoded before an interruption"
            );
            self.emit(SessionEvent::StaleAudioDiscarded {
                generation: ticket.generation,
            });
            return;
        }

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                SessionCounters::bump(&self.counters.decode_failures);
                tracing::warn!(sequence = ticket.sequence, "Dropping undecodable audio: {}", e);
                self.emit(SessionEvent::DecodeFailed {
                    error: e.to_string(),
                });
                return;
            }
        };

        let Some(output) = self.resources.output.as_mut() else {
            return;
        };
        match self.resources.scheduler.schedule(output.as_mut(), audio) {
            Ok(item) => {
                SessionCounters::bump(&self.counters.buffers_scheduled);
                self.status.set_speaking(true);
                self.emit(SessionEvent::PlaybackScheduled {
                    id: item.id,
                    start: item.start,
                    duration: item.duration(),
                });
            }
            Err(e) => {
                self.fail(e);
            }
        }
    }

    fn on_playback_finished(&mut self, id: PlaybackId) {
        // Buffers stopped by an interruption are already gone
        if self.resources.scheduler.finished(id).is_none() {
            return;
        }
        self.status.set_speaking(self.resources.scheduler.is_speaking());
        self.emit(SessionEvent::PlaybackFinished { id });
    }

    /// Records `err`, releases everything and ends in `Failed`.
    fn fail(&mut self, err: VoiceSessionError) -> VoiceSessionError {
        tracing::error!(state = %self.state, category = ?err.category(), "Voice session failed: {}", err);
        self.status.set_error(Some(err.to_string()));
        self.release();
        self.transition(SessionState::Failed);
        err
    }

    fn release(&mut self) -> ReleaseReport {
        let report = self.resources.release_all();
        self.status.set_speaking(false);
        if !report.is_empty() {
            SessionCounters::bump(&self.counters.release_passes);
            tracing::info!(?report, "Released session resources");
            self.emit(SessionEvent::ResourcesReleased { report });
        }
        report
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.status.set_state(to);
        tracing::info!(%from, %to, "Session state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Cloneable handle for observing and stopping a session from any task.
#[derive(Debug, Clone)]
pub struct SessionControl {
    inbox: InboxSender,
    status: watch::Receiver<SessionStatus>,
    counters: Arc<SessionCounters>,
}

impl SessionControl {
    /// Asks the session to disconnect.
    ///
    /// The request is handled on the session's own task the next time it
    /// processes input. Returns `false` if the session is gone.
    pub fn disconnect(&self) -> bool {
        self.inbox.send(SessionInput::Disconnect).is_ok()
    }

    /// Current observable status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioBackend;
    use crate::transport::MockTransport;

    fn controller() -> (SessionController, MockAudioBackend, MockTransport) {
        let backend = MockAudioBackend::new();
        let transport = MockTransport::new();
        let controller = SessionController::new(
            SessionConfig::default(),
            Arc::new(transport.clone()),
            Arc::new(backend.clone()),
            None,
        );
        (controller, backend, transport)
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (controller, _, _) = controller();
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.status(), SessionStatus::default());
        assert!(controller.language().is_none());
    }

    #[test]
    fn test_disconnect_from_idle_closes_without_release() {
        let (mut controller, backend, _) = controller();
        controller.disconnect();
        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(controller.stats().release_passes, 0);
        assert_eq!(backend.output_opens(), 0);
    }

    #[tokio::test]
    async fn test_connect_reaches_active() {
        let (mut controller, backend, transport) = controller();
        controller.connect(Language::Burmese).await.unwrap();

        assert_eq!(controller.state(), SessionState::Active);
        assert!(controller.status().connected);
        assert_eq!(controller.language(), Some(Language::Burmese));
        assert_eq!(backend.input_opens(), 1);
        assert_eq!(backend.output_opens(), 1);
        assert_eq!(transport.remote().opens(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_keeps_idle() {
        let backend = MockAudioBackend::new();
        let config = SessionConfig {
            frame_size: 0,
            ..Default::default()
        };
        let mut controller = SessionController::new(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(backend.clone()),
            None,
        );

        let err = controller.connect(Language::English).await.unwrap_err();
        assert!(matches!(err, VoiceSessionError::InvalidConfig(_)));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(backend.output_opens(), 0);
    }

    #[tokio::test]
    async fn test_control_disconnect_is_processed() {
        let (mut controller, backend, _) = controller();
        controller.connect(Language::English).await.unwrap();

        let control = controller.control();
        assert!(control.disconnect());
        controller.run().await;

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(control.status().state, SessionState::Closed);
        assert_eq!(backend.input_closes(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_devices() {
        let (mut controller, backend, transport) = controller();
        controller.connect(Language::English).await.unwrap();
        drop(controller);

        assert_eq!(backend.input_closes(), 1);
        assert_eq!(backend.output_closes(), 1);
        assert!(transport.remote().client_closed());
    }
}
