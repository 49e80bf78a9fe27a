//! Scripted transport for testing without a network.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::{
    Blob, ClientMessage, GoAway, ModelTurn, Part, ServerContent, ServerMessage, SetupMessage,
    Transport, TransportEvent, TransportLink,
};
use crate::chunk::DecodedAudio;
use crate::format::{encode_pcm16_le, pcm_mime};
use crate::session::TransportEvents;
use crate::VoiceSessionError;

#[derive(Default)]
struct MockTransportState {
    failure: Option<String>,
    hang: bool,
    opens: usize,
    setup: Option<SetupMessage>,
    events: Option<TransportEvents>,
    outbound: Option<mpsc::UnboundedReceiver<ClientMessage>>,
    shutdown: Option<oneshot::Receiver<()>>,
    sent: Vec<Blob>,
    client_closed: bool,
}

/// Transport whose remote side is driven by a [`MockRemote`].
///
/// `open` succeeds immediately (unless scripted otherwise) and records the
/// handshake. Nothing is acknowledged until the test calls
/// [`MockRemote::ready`].
///
/// # Example
///
/// ```
/// use live_voice::transport::MockTransport;
///
/// let transport = MockTransport::new();
/// let remote = transport.remote();
/// transport.fail_with("handshake rejected");
/// assert_eq!(remote.opens(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    /// Creates a transport that opens successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open` fail with a connection failure.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.state.lock().failure = Some(reason.into());
    }

    /// Makes `open` never resolve.
    pub fn hang(&self) {
        self.state.lock().hang = true;
    }

    /// Handle on the remote side of the channel.
    pub fn remote(&self) -> MockRemote {
        MockRemote {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        setup: SetupMessage,
        events: TransportEvents,
    ) -> Result<TransportLink, VoiceSessionError> {
        let hang = {
            let state = self.state.lock();
            if let Some(reason) = state.failure.clone() {
                return Err(VoiceSessionError::connection_failure(reason));
            }
            state.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        let mut state = self.state.lock();
        state.opens += 1;
        state.setup = Some(setup);
        state.events = Some(events);
        state.outbound = Some(outbound_rx);
        state.shutdown = Some(shutdown_rx);
        state.sent.clear();
        state.client_closed = false;

        Ok(TransportLink::new(outbound).with_shutdown(shutdown))
    }
}

/// The remote end of a [`MockTransport`].
///
/// Every `send_*` call is delivered to the session as a [`TransportEvent`],
/// exactly as a real transport's reader task would.
#[derive(Clone)]
pub struct MockRemote {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockRemote {
    fn emit(&self, event: TransportEvent) -> bool {
        self.state
            .lock()
            .events
            .as_ref()
            .is_some_and(|events| events.emit(event))
    }

    /// Number of times the channel was opened.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// The handshake received on the last open.
    pub fn setup(&self) -> Option<SetupMessage> {
        self.state.lock().setup.clone()
    }

    /// Acknowledges the handshake.
    pub fn ready(&self) -> bool {
        self.emit(TransportEvent::Ready)
    }

    /// Delivers a raw server message.
    pub fn send_message(&self, message: ServerMessage) -> bool {
        self.emit(TransportEvent::Message(message))
    }

    /// Delivers a model turn carrying `audio` as one inline PCM part.
    pub fn send_audio(&self, audio: &DecodedAudio) -> bool {
        self.send_payload(
            STANDARD.encode(encode_pcm16_le(&audio.samples)),
            pcm_mime(audio.sample_rate),
        )
    }

    /// Delivers a model turn with one inline part holding `data` as-is.
    pub fn send_payload(&self, data: impl Into<String>, mime_type: impl Into<String>) -> bool {
        self.send_parts(vec![Blob {
            data: data.into(),
            mime_type: mime_type.into(),
        }])
    }

    /// Delivers a model turn with several inline parts.
    pub fn send_parts(&self, blobs: Vec<Blob>) -> bool {
        let parts = blobs
            .into_iter()
            .map(|blob| Part {
                inline_data: Some(blob),
            })
            .collect();
        self.send_message(ServerMessage {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn { parts }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Signals that the user spoke over the model.
    pub fn interrupt(&self) -> bool {
        self.send_message(ServerMessage {
            server_content: Some(ServerContent {
                interrupted: true,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Signals the end of the model's turn.
    pub fn turn_complete(&self) -> bool {
        self.send_message(ServerMessage {
            server_content: Some(ServerContent {
                turn_complete: true,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Announces that the channel will close.
    pub fn go_away(&self, time_left: impl Into<String>) -> bool {
        self.send_message(ServerMessage {
            go_away: Some(GoAway {
                time_left: Some(time_left.into()),
            }),
            ..Default::default()
        })
    }

    /// Closes the channel from the remote side.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code: Some(code),
            reason: reason.into(),
        })
    }

    /// Fails the channel.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error {
            reason: reason.into(),
        })
    }

    /// Audio the client has sent so far on the current channel, in order.
    pub fn sent_audio(&self) -> Vec<Blob> {
        let mut state = self.state.lock();
        let mut received = Vec::new();
        if let Some(outbound) = state.outbound.as_mut() {
            while let Ok(message) = outbound.try_recv() {
                if let ClientMessage::RealtimeInput(input) = message {
                    received.push(input.audio);
                }
            }
        }
        state.sent.extend(received);
        state.sent.clone()
    }

    /// Returns `true` once the client closed the channel.
    pub fn client_closed(&self) -> bool {
        let mut state = self.state.lock();
        if !state.client_closed {
            if let Some(shutdown) = state.shutdown.as_mut() {
                // Either a signal or a dropped sender means the client let go
                state.client_closed = !matches!(
                    shutdown.try_recv(),
                    Err(oneshot::error::TryRecvError::Empty)
                );
            }
        }
        state.client_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Language, SessionConfig};
    use crate::session::{inbox, SessionInput};

    fn setup() -> SetupMessage {
        SetupMessage::new(&SessionConfig::default(), Language::English)
    }

    #[tokio::test]
    async fn test_open_records_setup() {
        let transport = MockTransport::new();
        let remote = transport.remote();
        let (tx, _rx) = inbox();

        transport.open(setup(), TransportEvents::new(tx)).await.unwrap();
        assert_eq!(remote.opens(), 1);
        assert_eq!(remote.setup().unwrap().model, SessionConfig::default().model);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let transport = MockTransport::new();
        transport.fail_with("no route");
        let (tx, _rx) = inbox();

        let err = transport
            .open(setup(), TransportEvents::new(tx))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceSessionError::ConnectionFailure { ref reason } if reason == "no route"));
    }

    #[tokio::test]
    async fn test_remote_events_reach_inbox() {
        let transport = MockTransport::new();
        let remote = transport.remote();
        let (tx, mut rx) = inbox();
        transport.open(setup(), TransportEvents::new(tx)).await.unwrap();

        assert!(remote.ready());
        assert!(remote.send_audio(&DecodedAudio::silence(240, 24000)));
        assert!(remote.interrupt());

        assert!(matches!(
            rx.try_recv(),
            Ok(SessionInput::Transport(TransportEvent::Ready))
        ));
        match rx.try_recv() {
            Ok(SessionInput::Transport(TransportEvent::Message(message))) => {
                let parts: Vec<&Blob> = message.audio_parts().collect();
                assert_eq!(parts.len(), 1);
                assert_eq!(parts[0].mime_type, "audio/pcm;rate=24000");
            }
            other => panic!("expected audio message, got {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionInput::Transport(TransportEvent::Message(m))) if m.is_interrupted()
        ));
    }

    #[tokio::test]
    async fn test_sent_audio_and_client_close() {
        let transport = MockTransport::new();
        let remote = transport.remote();
        let (tx, _rx) = inbox();
        let mut link = transport.open(setup(), TransportEvents::new(tx)).await.unwrap();

        link.outbound
            .send(ClientMessage::audio(crate::chunk::EncodedAudioChunk {
                data: "AEA=".into(),
                mime_type: "audio/pcm;rate=16000".into(),
                sequence: 0,
            }))
            .unwrap();
        assert_eq!(remote.sent_audio().len(), 1);
        assert!(!remote.client_closed());

        link.shutdown.take().unwrap().send(()).unwrap();
        assert!(remote.client_closed());
    }
}
