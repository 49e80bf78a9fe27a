//! Builder pattern for `LiveVoice`.

use std::sync::Arc;

use crate::audio::{AudioBackend, CpalBackend};
use crate::session::SessionController;
use crate::transport::{Transport, WebSocketTransport};
use crate::{event_callback, EventCallback, SessionConfig, SessionEvent, VoiceSessionError};

/// Entry point for creating voice sessions.
///
/// # Example
///
/// ```ignore
/// use live_voice::{Language, LiveVoice, SessionConfig};
///
/// let mut session = LiveVoice::builder()
///     .config(SessionConfig::default().with_api_key(std::env::var("GEMINI_API_KEY")?))
///     .build()?;
///
/// session.connect(Language::English).await?;
/// session.run().await;
/// ```
pub struct LiveVoice;

impl LiveVoice {
    /// Creates a builder with default settings.
    pub fn builder() -> LiveVoiceBuilder {
        LiveVoiceBuilder::new()
    }
}

/// Builder for configuring a voice session.
///
/// Use [`LiveVoice::builder()`] to create a new builder. Unless overridden,
/// sessions use the system's default microphone and speaker through CPAL and
/// the WebSocket endpoint named in the configuration.
///
/// # Testing Example
///
/// ```
/// use live_voice::audio::MockAudioBackend;
/// use live_voice::transport::MockTransport;
/// use live_voice::{LiveVoice, SessionState};
///
/// let session = LiveVoice::builder()
///     .backend(MockAudioBackend::new())
///     .transport(MockTransport::new())
///     .build()
///     .unwrap();
///
/// assert_eq!(session.state(), SessionState::Idle);
/// ```
#[must_use]
pub struct LiveVoiceBuilder {
    /// Session configuration.
    config: SessionConfig,
    /// Channel to the endpoint; WebSocket when unset.
    transport: Option<Arc<dyn Transport>>,
    /// Audio devices; CPAL when unset.
    backend: Option<Arc<dyn AudioBackend>>,
    /// Event callback.
    event_callback: Option<EventCallback>,
}

impl Default for LiveVoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveVoiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            transport: None,
            backend: None,
            event_callback: None,
        }
    }

    /// Set the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of the WebSocket endpoint.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom audio backend instead of CPAL.
    ///
    /// Sessions built from the same backend share its device leases, so only
    /// one of them can hold the microphone at a time.
    pub fn backend<B: AudioBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Use a shared audio backend.
    pub fn shared_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include state changes, interruptions, dropped payloads and
    /// input silence warnings.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Builds an idle session.
    ///
    /// Nothing is opened until [`SessionController::connect()`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<SessionController, VoiceSessionError> {
        self.config.validate()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::from_config(&self.config)));
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(CpalBackend::new()));

        tracing::debug!(
            endpoint = %self.config.endpoint,
            model = %self.config.model,
            voice = %self.config.voice_name,
            "Building voice session"
        );

        Ok(SessionController::new(
            self.config,
            transport,
            backend,
            self.event_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioBackend;
    use crate::transport::MockTransport;
    use crate::SessionState;

    #[test]
    fn test_builder_defaults() {
        let builder = LiveVoice::builder();
        assert!(builder.transport.is_none());
        assert!(builder.backend.is_none());
        assert!(builder.event_callback.is_none());
        assert_eq!(builder.config.frame_size, 4096);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = SessionConfig {
            input_sample_rate: 0,
            ..Default::default()
        };
        let result = LiveVoice::builder().config(config).build();
        assert!(matches!(result, Err(VoiceSessionError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_with_mocks() {
        let session = LiveVoice::builder()
            .backend(MockAudioBackend::new())
            .transport(MockTransport::new())
            .on_event(|_| {})
            .build()
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_shared_backend_shares_leases() {
        let backend = MockAudioBackend::new();
        let shared: Arc<dyn AudioBackend> = Arc::new(backend.clone());
        let first = LiveVoice::builder()
            .shared_backend(Arc::clone(&shared))
            .transport(MockTransport::new())
            .build();
        let second = LiveVoice::builder()
            .shared_backend(shared)
            .transport(MockTransport::new())
            .build();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}
