//! WebSocket transport to the live endpoint.

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;

use super::{ClientMessage, ServerMessage, SetupMessage, Transport, TransportEvent, TransportLink};
use crate::config::SessionConfig;
use crate::session::TransportEvents;
use crate::VoiceSessionError;
use async_trait::async_trait;

/// Transport speaking JSON over a WebSocket.
///
/// The setup handshake is sent as soon as the socket opens. A writer task
/// drains the outbound queue; a reader task parses inbound frames (text or
/// binary) and reports them as [`TransportEvent`]s.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
    api_key: Option<String>,
}

impl WebSocketTransport {
    /// Creates a transport for `endpoint`, authenticating with `api_key` if given.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Creates a transport from the endpoint and key of a session config.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key.clone())
    }

    /// URL the socket connects to, with the key as a query parameter.
    pub fn url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let separator = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{separator}key={key}", self.endpoint)
            }
            None => self.endpoint.clone(),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        setup: SetupMessage,
        events: TransportEvents,
    ) -> Result<TransportLink, VoiceSessionError> {
        // Fails harmlessly if the application already installed a provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        tracing::info!(endpoint = %self.endpoint, model = %setup.model, "Opening channel");
        let (socket, _response) = connect_async(self.url())
            .await
            .map_err(|e| VoiceSessionError::connection_failure(e.to_string()))?;
        let (mut write, read) = socket.split();

        let handshake = ClientMessage::Setup(setup).to_json()?;
        write
            .send(Message::Text(handshake))
            .await
            .map_err(|e| VoiceSessionError::connection_failure(e.to_string()))?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        // Writer: exits after sending a close frame, or when the session drops its sender
        let writer_events = events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json)).await {
                            writer_events.emit(TransportEvent::Error {
                                reason: e.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        });

        let reader = tokio::spawn(read_loop(read, events));

        Ok(TransportLink::new(outbound)
            .with_shutdown(shutdown)
            .with_task(reader))
    }
}

/// Reads frames until the socket closes or fails, reporting each as an event.
async fn read_loop<S>(mut read: S, events: TransportEvents)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = read.next().await {
        let delivered = match frame {
            Ok(Message::Text(text)) => dispatch(text.as_bytes(), &events),
            Ok(Message::Binary(bytes)) => dispatch(&bytes, &events),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame.map_or((None, String::new()), |f| {
                    (Some(u16::from(f.code)), f.reason.to_string())
                });
                tracing::info!(?code, %reason, "Channel closed by endpoint");
                events.emit(TransportEvent::Closed { code, reason });
                return;
            }
            // Pings are answered by tungstenite itself
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Channel error: {}", e);
                events.emit(TransportEvent::Error {
                    reason: e.to_string(),
                });
                return;
            }
        };
        if !delivered {
            return;
        }
    }

    events.emit(TransportEvent::Closed {
        code: None,
        reason: String::new(),
    });
}

/// Parses one inbound frame. Returns `false` once the session is gone.
fn dispatch(payload: &[u8], events: &TransportEvents) -> bool {
    match ServerMessage::parse(payload) {
        Ok(message) if message.is_setup_complete() => events.emit(TransportEvent::Ready),
        Ok(message) => events.emit(TransportEvent::Message(message)),
        Err(e) => {
            tracing::warn!("Ignoring unparseable frame: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{inbox, InboxReceiver, SessionInput};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn transport_events(rx: &mut InboxReceiver) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(SessionInput::Transport(event)) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_url_with_key() {
        let transport = WebSocketTransport::new("wss://example.com/live", Some("abc".into()));
        assert_eq!(transport.url(), "wss://example.com/live?key=abc");

        let transport = WebSocketTransport::new("wss://example.com/live?alt=json", Some("abc".into()));
        assert_eq!(transport.url(), "wss://example.com/live?alt=json&key=abc");

        let transport = WebSocketTransport::new("ws://localhost:9000", None);
        assert_eq!(transport.url(), "ws://localhost:9000");
    }

    #[tokio::test]
    async fn test_read_loop_reports_frames_in_order() {
        let (tx, mut rx) = inbox();
        let frames = futures::stream::iter(vec![
            Ok(Message::Text(r#"{"setupComplete": {}}"#.to_string())),
            Ok(Message::Binary(br#"{"serverContent": {"interrupted": true}}"#.to_vec())),
            Ok(Message::Text("garbage".to_string())),
            Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))),
        ]);

        read_loop(frames, TransportEvents::new(tx)).await;

        let events = transport_events(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TransportEvent::Ready));
        assert!(matches!(&events[1], TransportEvent::Message(m) if m.is_interrupted()));
        assert!(matches!(
            &events[2],
            TransportEvent::Closed { code: Some(1000), reason } if reason == "bye"
        ));
    }

    #[tokio::test]
    async fn test_read_loop_reports_errors() {
        let (tx, mut rx) = inbox();
        let frames = futures::stream::iter(vec![Err(WsError::ConnectionClosed)]);

        read_loop(frames, TransportEvents::new(tx)).await;

        let events = transport_events(&mut rx);
        assert!(matches!(events.as_slice(), [TransportEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn test_read_loop_end_of_stream_is_close() {
        let (tx, mut rx) = inbox();
        let frames = futures::stream::iter(Vec::<Result<Message, WsError>>::new());

        read_loop(frames, TransportEvents::new(tx)).await;

        let events = transport_events(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [TransportEvent::Closed { code: None, .. }]
        ));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_connect_refused_is_connection_failure() {
        let (tx, _rx) = inbox();
        let transport = WebSocketTransport::new("ws://127.0.0.1:9", None);
        let setup = SetupMessage::new(&SessionConfig::default(), crate::Language::English);
        let result = transport.open(setup, TransportEvents::new(tx)).await;
        assert!(matches!(
            result,
            Err(VoiceSessionError::ConnectionFailure { .. })
        ));
    }
}
