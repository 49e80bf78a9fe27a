//! Configuration types for voice sessions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::VoiceSessionError;

/// Sample rate of captured microphone audio sent to the endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech received from the endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Number of mono samples per captured frame.
pub const FRAME_SIZE: usize = 4096;

/// Live endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Conversational model requested in the setup handshake.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Prebuilt voice used for synthesized replies.
pub const DEFAULT_VOICE: &str = "Kore";

const DEFAULT_PERSONA: &str = "You are a professional, calm, and helpful Forex trading assistant. \
Your goal is to help the user analyzing their trades, discuss market psychology, and provide educational concepts. \
Keep your responses concise and conversational.";

/// Spoken language of the conversation.
///
/// Fixed when the session connects; switching language requires a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    /// English.
    #[default]
    English,
    /// Burmese (Myanmar).
    Burmese,
    /// Arakanese (Rakhine), with Burmese accepted as a fallback.
    Arakanese,
}

impl Language {
    /// Short language code (`en`, `mm`, `rk`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Burmese => "mm",
            Self::Arakanese => "rk",
        }
    }

    /// Language name as given to the model in the system instruction.
    #[must_use]
    pub fn spoken_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Burmese => "Burmese",
            Self::Arakanese => "Arakanese (Rakhine) or Burmese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = VoiceSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "mm" | "my" | "burmese" => Ok(Self::Burmese),
            "rk" | "rki" | "arakanese" | "rakhine" => Ok(Self::Arakanese),
            other => Err(VoiceSessionError::InvalidConfig(format!(
                "unknown language '{other}'"
            ))),
        }
    }
}

/// Configuration for a voice session.
///
/// Use [`SessionConfig::default()`] for the standard live endpoint and audio
/// formats, then override what you need.
///
/// # Example
///
/// ```
/// use live_voice::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_api_key("secret")
///     .with_voice("Puck")
///     .with_connect_timeout(Some(Duration::from_secs(5)));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the live endpoint.
    pub endpoint: String,

    /// API key appended to the endpoint URL as `?key=`.
    pub api_key: Option<String>,

    /// Model requested in the setup handshake.
    pub model: String,

    /// Prebuilt voice for synthesized replies.
    pub voice_name: String,

    /// Persona text of the system instruction. The reply-language sentence
    /// is appended at connect time.
    pub persona: String,

    /// Sample rate of outgoing microphone audio.
    /// Default: 16kHz
    pub input_sample_rate: u32,

    /// Assumed sample rate of inbound audio when its mime tag has no rate.
    /// Default: 24kHz
    pub output_sample_rate: u32,

    /// Mono samples per captured frame.
    /// Default: 4096
    pub frame_size: usize,

    /// Capacity of the capture ring buffer between the device callback and
    /// the capture bridge.
    /// Default: 10 seconds
    pub capture_buffer_duration: Duration,

    /// How often the capture bridge drains the ring buffer.
    /// Default: 50ms
    pub capture_poll_interval: Duration,

    /// Upper bound on opening the channel, and again on the endpoint's
    /// setup acknowledgement once the session is active. `None` waits for
    /// the transport to report success or failure.
    /// Default: 15 seconds
    pub connect_timeout: Option<Duration>,

    /// Name of the input device, or `None` for the system default.
    pub input_device: Option<String>,

    /// Name of the output device, or `None` for the system default.
    pub output_device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: FRAME_SIZE,
            capture_buffer_duration: Duration::from_secs(10),
            capture_poll_interval: Duration::from_millis(50),
            connect_timeout: Some(Duration::from_secs(15)),
            input_device: None,
            output_device: None,
        }
    }
}

impl SessionConfig {
    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the prebuilt voice.
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice_name = voice.into();
        self
    }

    /// Sets the persona text of the system instruction.
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Full system instruction sent in the setup handshake.
    #[must_use]
    pub fn system_instruction(&self, language: Language) -> String {
        let name = language.spoken_name();
        format!(
            "{}\nThe user speaks {name}. Please reply in {name}.",
            self.persona.trim_end()
        )
    }

    /// Mime tag attached to every outgoing audio chunk.
    #[must_use]
    pub fn input_mime_type(&self) -> String {
        crate::format::pcm_mime(self.input_sample_rate)
    }

    /// Duration of one captured frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        crate::chunk::frames_to_duration(self.frame_size as u64, self.input_sample_rate)
    }

    /// Checks that the configuration can start a session.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), VoiceSessionError> {
        if self.endpoint.trim().is_empty() {
            return Err(VoiceSessionError::InvalidConfig(
                "endpoint must not be empty".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(VoiceSessionError::InvalidConfig(
                "model must not be empty".into(),
            ));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(VoiceSessionError::InvalidConfig(
                "sample rates must be non-zero".into(),
            ));
        }
        if self.frame_size == 0 {
            return Err(VoiceSessionError::InvalidConfig(
                "frame size must be non-zero".into(),
            ));
        }
        if self.capture_poll_interval.is_zero() {
            return Err(VoiceSessionError::InvalidConfig(
                "capture poll interval must be non-zero".into(),
            ));
        }
        if self.capture_buffer_duration < self.frame_duration() {
            return Err(VoiceSessionError::InvalidConfig(
                "capture buffer must hold at least one frame".into(),
            ));
        }
        Ok(())
    }
}
