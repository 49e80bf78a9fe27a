//! Capture bridge task - reads from the ring buffer, frames and encodes audio,
//! hands chunks to the session.
//!
//! The bridge is the only consumer of the microphone ring buffer. It:
//! - Polls the ring buffer at a fixed interval (never touching the device thread)
//! - Cuts exact frames at the outgoing rate
//! - Encodes each frame and submits it to the session inbox in capture order
//! - Reports when input goes silent or becomes audible again

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::Framer;
use crate::chunk::AudioFrame;
use crate::event::EventCallback;
use crate::format::encode_frame;
use crate::session::{InboxSender, SessionCounters, SessionInput};
use crate::SessionEvent;

/// Silence longer than this is reported as `InputSilent`.
const SILENCE_THRESHOLD: Duration = Duration::from_millis(500);

/// Log a progress line every this many frames.
const DEBUG_EVERY: u64 = 50;

/// Tracks whether the microphone delivers audible input.
///
/// A muted microphone, or a platform that substitutes zeros for a refused
/// device, delivers exact digital silence; real microphones never do. Silence
/// inside frames is measured in captured audio time, so the poll cadence
/// doesn't matter. A device that delivers nothing at all is measured on the
/// wall clock instead.
struct InputFlow {
    /// Captured audio since the last audible frame.
    silent_audio: Duration,
    last_audible: Instant,
    silence_reported: bool,
}

impl InputFlow {
    fn new() -> Self {
        Self {
            silent_audio: Duration::ZERO,
            last_audible: Instant::now(),
            silence_reported: false,
        }
    }

    fn observe(&mut self, frame: &AudioFrame) -> Option<SessionEvent> {
        if frame.samples.iter().any(|&s| s != 0.0) {
            self.silent_audio = Duration::ZERO;
            self.last_audible = Instant::now();
            return std::mem::take(&mut self.silence_reported).then_some(SessionEvent::InputResumed);
        }
        self.silent_audio += frame.duration();
        self.report_silence(self.silent_audio)
    }

    fn stalled(&mut self) -> Option<SessionEvent> {
        let silent_for = self.last_audible.elapsed().max(self.silent_audio);
        self.report_silence(silent_for)
    }

    /// Reports a silent stretch once.
    fn report_silence(&mut self, silent_for: Duration) -> Option<SessionEvent> {
        if self.silence_reported || silent_for < SILENCE_THRESHOLD {
            return None;
        }
        self.silence_reported = true;
        Some(SessionEvent::InputSilent { silent_for })
    }
}

/// Configuration for the capture bridge task.
#[derive(Debug, Clone)]
pub(crate) struct CaptureConfig {
    /// Mime tag attached to every chunk.
    pub mime_type: String,
    /// How often the ring buffer is drained.
    pub poll_interval: Duration,
}

/// The capture bridge reads audio from the ring buffer and submits encoded chunks.
pub(crate) struct CaptureBridge {
    framer: Framer,
    config: CaptureConfig,
    inbox: InboxSender,
    counters: Arc<SessionCounters>,
    running: Arc<AtomicBool>,
    flow: InputFlow,
    event_callback: Option<EventCallback>,
}

impl CaptureBridge {
    pub fn new(
        framer: Framer,
        config: CaptureConfig,
        inbox: InboxSender,
        counters: Arc<SessionCounters>,
        running: Arc<AtomicBool>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            framer,
            config,
            inbox,
            counters,
            running,
            flow: InputFlow::new(),
            event_callback,
        }
    }

    /// Runs until stopped or the session goes away.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let frames = self.framer.read_frames();
            if frames.is_empty() {
                if let Some(event) = self.flow.stalled() {
                    self.emit_event(event);
                }
                continue;
            }

            for frame in frames {
                if let Some(event) = self.flow.observe(&frame) {
                    self.emit_event(event);
                }
                if !self.submit(&frame) {
                    // Session inbox closed, stop capturing
                    return;
                }
            }
        }
        tracing::debug!("Capture bridge stopped");
    }

    fn submit(&self, frame: &AudioFrame) -> bool {
        let chunk = encode_frame(frame, &self.config.mime_type);
        let captured = SessionCounters::bump(&self.counters.chunks_captured);

        if captured % DEBUG_EVERY == 0 {
            tracing::debug!(
                sequence = frame.sequence,
                samples = frame.len(),
                "Captured frame #{}",
                captured
            );
        }

        self.inbox.send(SessionInput::Captured(chunk)).is_ok()
    }

    fn emit_event(&self, event: SessionEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

/// Handle to a running capture bridge.
pub(crate) struct CaptureHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Stops the bridge immediately. Frames not yet submitted are discarded.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Spawns the capture bridge as a background task.
pub(crate) fn spawn_capture_bridge(
    framer: Framer,
    config: CaptureConfig,
    inbox: InboxSender,
    counters: Arc<SessionCounters>,
    event_callback: Option<EventCallback>,
) -> CaptureHandle {
    let running = Arc::new(AtomicBool::new(true));
    let bridge = CaptureBridge::new(
        framer,
        config,
        inbox,
        counters,
        Arc::clone(&running),
        event_callback,
    );
    CaptureHandle {
        running,
        task: tokio::spawn(bridge.run()),
    }
}
