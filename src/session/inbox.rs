//! The controller's inbox.
//!
//! Every producer in a session (capture task, transport reader, decode
//! worker, playback engine) reports to the controller through one unbounded
//! channel. Sends never block, and the controller handles inputs strictly in
//! arrival order on its own task.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::chunk::{EncodedAudioChunk, PlaybackId};
use crate::pipeline::DecodeOutcome;
use crate::transport::TransportEvent;

/// Everything the controller reacts to.
#[derive(Debug)]
pub(crate) enum SessionInput {
    /// Disconnect requested through a [`SessionControl`](crate::SessionControl).
    Disconnect,
    /// Open/message/close/error notification from the transport.
    Transport(TransportEvent),
    /// A captured frame, encoded and ready to send.
    Captured(EncodedAudioChunk),
    /// A decode finished (successfully or not).
    Decoded(DecodeOutcome),
    /// The playback engine finished rendering a buffer.
    PlaybackFinished(PlaybackId),
    /// The setup acknowledgement deadline armed on activation has passed.
    ReadyDeadline(Duration),
}

pub(crate) type InboxSender = mpsc::UnboundedSender<SessionInput>;
pub(crate) type InboxReceiver = mpsc::UnboundedReceiver<SessionInput>;

pub(crate) fn inbox() -> (InboxSender, InboxReceiver) {
    mpsc::unbounded_channel()
}

/// Reports finished playback buffers back to the session.
///
/// Handed to [`AudioBackend::open_output`](crate::audio::AudioBackend::open_output).
/// [`finished()`](PlaybackNotifier::finished) never blocks, so it is safe to
/// call from a real-time audio callback.
#[derive(Debug, Clone)]
pub struct PlaybackNotifier {
    inbox: InboxSender,
}

impl PlaybackNotifier {
    pub(crate) fn new(inbox: InboxSender) -> Self {
        Self { inbox }
    }

    /// Reports that the buffer `id` has played to completion.
    ///
    /// Returns `false` if the session is gone.
    pub fn finished(&self, id: PlaybackId) -> bool {
        self.inbox.send(SessionInput::PlaybackFinished(id)).is_ok()
    }
}

/// Delivers transport notifications to the session.
///
/// Handed to [`Transport::open`](crate::transport::Transport::open); the
/// transport's reader task emits one [`TransportEvent`] per notification.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    inbox: InboxSender,
}

impl TransportEvents {
    pub(crate) fn new(inbox: InboxSender) -> Self {
        Self { inbox }
    }

    /// Delivers an event. Returns `false` if the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.inbox.send(SessionInput::Transport(event)).is_ok()
    }

    /// Returns `true` if the session has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_notifier_delivers() {
        let (tx, mut rx) = inbox();
        let notifier = PlaybackNotifier::new(tx);

        assert!(notifier.finished(PlaybackId(4)));
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionInput::PlaybackFinished(PlaybackId(4)))
        ));
    }

    #[test]
    fn test_transport_events_after_drop() {
        let (tx, rx) = inbox();
        let events = TransportEvents::new(tx);
        drop(rx);

        assert!(events.is_closed());
        assert!(!events.emit(TransportEvent::Ready));
    }
}
