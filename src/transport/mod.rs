//! Bidirectional channel to the conversation endpoint.
//!
//! A [`Transport`] opens the channel, sends the setup handshake and spawns
//! whatever tasks it needs to move messages. From then on:
//!
//! - the session pushes [`ClientMessage`]s into the link's outbound queue
//!   (fire-and-forget, never awaited)
//! - the transport reports readiness, inbound messages, closure and errors
//!   as [`TransportEvent`]s through [`TransportEvents`]
//!
//! [`WebSocketTransport`] talks to the live endpoint; [`MockTransport`]
//! scripts the remote side for tests.

mod handle;
mod mock;
mod outbound;
mod protocol;
mod websocket;

pub(crate) use handle::{SessionHandle, Submitted};
pub use mock::{MockRemote, MockTransport};
pub use outbound::OutboundQueue;
pub use protocol::{
    Blob, ClientMessage, Content, GenerationConfig, GoAway, ModelTurn, Part, PrebuiltVoiceConfig,
    RealtimeInput, ServerContent, ServerMessage, SetupMessage, SpeechConfig, TextPart,
    VoiceConfig,
};
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use crate::session::TransportEvents;
use crate::VoiceSessionError;

/// Notifications from an open channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The endpoint acknowledged the setup handshake; audio may flow.
    Ready,
    /// An inbound message other than the handshake acknowledgement.
    Message(ServerMessage),
    /// The channel closed.
    Closed {
        /// Close code, if the endpoint sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// The channel failed.
    Error {
        /// Description of the failure.
        reason: String,
    },
}

/// An open channel, as returned by [`Transport::open`].
///
/// Dropping the link does not stop the transport's tasks; the session closes
/// it explicitly during teardown.
#[derive(Debug)]
pub struct TransportLink {
    /// Queue of messages to send, drained by the transport.
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    /// Fired to close the channel.
    pub shutdown: Option<oneshot::Sender<()>>,
    /// Tasks moving messages; aborted on close.
    pub tasks: Vec<JoinHandle<()>>,
}

impl TransportLink {
    /// Creates a link with no background tasks.
    pub fn new(outbound: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self {
            outbound,
            shutdown: None,
            tasks: Vec::new(),
        }
    }

    /// Sets the shutdown signal.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: oneshot::Sender<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Adds a task that is aborted when the link closes.
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }
}

/// Opens channels to the conversation endpoint.
///
/// # Implementation Notes
///
/// - `open` resolves once the channel is open and the handshake was sent;
///   it must not wait for the acknowledgement, which is reported as
///   [`TransportEvent::Ready`]
/// - Errors from `open` are connection failures; errors after it returned
///   are reported as [`TransportEvent::Error`]
/// - Events must be emitted in the order they happened
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the channel and sends `setup` as the first message.
    async fn open(
        &self,
        setup: SetupMessage,
        events: TransportEvents,
    ) -> Result<TransportLink, VoiceSessionError>;
}
