//! Runtime events for monitoring a session.
//!
//! Events are non-fatal notifications about session behavior. They're for
//! logging, metrics and UI hints; the authoritative session status is the
//! [`SessionStatus`](crate::SessionStatus) watch channel.

use std::sync::Arc;
use std::time::Duration;

use crate::chunk::PlaybackId;
use crate::session::{ReleaseReport, SessionState};

/// Runtime events emitted during a voice session.
///
/// # Example
///
/// ```
/// use live_voice::SessionEvent;
///
/// fn handle_event(event: SessionEvent) {
///     match event {
///         SessionEvent::StateChanged { from, to } => {
///             eprintln!("session {from} -> {to}");
///         }
///         SessionEvent::DecodeFailed { error } => {
///             eprintln!("dropped an inbound chunk: {error}");
///         }
///         SessionEvent::Interrupted { stopped } => {
///             eprintln!("barge-in, stopped {stopped} buffers");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },

    /// Microphone capture started.
    CaptureStarted {
        /// Native sample rate of the input device.
        device_sample_rate: u32,
        /// Native channel count of the input device.
        device_channels: u16,
    },

    /// The endpoint acknowledged the setup handshake; queued audio was flushed.
    ChannelReady {
        /// Number of chunks that had been queued while waiting.
        flushed: usize,
    },

    /// No audible input has been captured for a while.
    ///
    /// Usually a muted microphone, or a platform that delivers silence
    /// instead of refusing access outright.
    InputSilent {
        /// How long the input has been silent.
        silent_for: Duration,
    },

    /// Audible input resumed after an [`InputSilent`](SessionEvent::InputSilent).
    InputResumed,

    /// A decoded buffer was scheduled for playback.
    PlaybackScheduled {
        /// Handle of the scheduled buffer.
        id: PlaybackId,
        /// Start offset on the output clock.
        start: Duration,
        /// Length of the buffer.
        duration: Duration,
    },

    /// A buffer finished playing.
    PlaybackFinished {
        /// Handle of the finished buffer.
        id: PlaybackId,
    },

    /// The endpoint signalled barge-in and local playback was halted.
    Interrupted {
        /// Number of buffers that were stopped.
        stopped: usize,
    },

    /// An inbound payload could not be decoded and was dropped.
    DecodeFailed {
        /// Description of the decode error.
        error: String,
    },

    /// A buffer decoded before the latest interruption was discarded.
    StaleAudioDiscarded {
        /// Interruption generation the decode was requested under.
        generation: u64,
    },

    /// The model finished its turn.
    TurnComplete,

    /// The endpoint announced it will close the connection soon.
    GoAway {
        /// Remaining time as reported by the endpoint, if any.
        time_left: Option<String>,
    },

    /// Session resources were released.
    ResourcesReleased {
        /// What was released in this pass.
        report: ReleaseReport,
    },
}

/// Callback type for receiving runtime events.
///
/// Register a callback via
/// [`LiveVoiceBuilder::on_event()`](crate::LiveVoiceBuilder::on_event).
/// Callbacks may be invoked from the capture task as well as the session's
/// own task, so they must be `Send + Sync`.
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use live_voice::{event_callback, SessionEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
