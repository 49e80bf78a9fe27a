//! Session lifecycle state and the observable status surface.

use std::fmt;

use tokio::sync::watch;

/// Lifecycle state of a voice session.
///
/// ```text
/// Idle --connect()--> Connecting --open--> Active --close/error/disconnect()--> Closed | Failed
/// Failed --disconnect()--> Closed
/// ```
///
/// `Closed` and `Failed` are terminal: no audio flows again, and all of the
/// session's resources have been released by the time either is reported.
/// The only move out of `Failed` is a `disconnect()`, which settles the
/// session in `Closed` and keeps the error in [`SessionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Created, not yet connected.
    #[default]
    Idle,
    /// Acquiring devices and opening the channel.
    Connecting,
    /// Channel open, microphone streaming.
    Active,
    /// Ended normally (explicit disconnect or remote close).
    Closed,
    /// Ended by an error.
    Failed,
}

impl SessionState {
    /// Returns `true` for `Closed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a UI should show for the session right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Not connected and no error.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected, waiting for the user to speak.
    Listening,
    /// Connected, assistant audio is playing.
    Speaking,
    /// The session ended with an error.
    Error,
}

/// Observable session status, published through a `tokio::sync::watch` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// `true` while the session is active.
    pub connected: bool,
    /// `true` while any playback buffer is scheduled or playing.
    pub speaking: bool,
    /// Message of the error that ended the session, if any.
    pub error: Option<String>,
}

impl SessionStatus {
    /// Collapses the status into a single UI activity.
    #[must_use]
    pub fn activity(&self) -> Activity {
        if self.error.is_some() {
            Activity::Error
        } else if self.connected && self.speaking {
            Activity::Speaking
        } else if self.connected {
            Activity::Listening
        } else if self.state == SessionState::Connecting {
            Activity::Connecting
        } else {
            Activity::Disconnected
        }
    }
}

/// Write side of the status channel. Only the controller holds one.
pub(crate) struct StatusPublisher {
    tx: watch::Sender<SessionStatus>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }

    pub fn set_state(&self, state: SessionState) {
        self.tx.send_if_modified(|status| {
            let connected = state == SessionState::Active;
            let speaking = status.speaking && connected;
            let changed =
                status.state != state || status.connected != connected || status.speaking != speaking;
            status.state = state;
            status.connected = connected;
            status.speaking = speaking;
            changed
        });
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.tx.send_if_modified(|status| {
            let speaking = speaking && status.connected;
            let changed = status.speaking != speaking;
            status.speaking = speaking;
            changed
        });
    }

    pub fn set_error(&self, error: Option<String>) {
        self.tx.send_if_modified(|status| {
            let changed = status.error != error;
            status.error = error;
            changed
        });
    }
}
