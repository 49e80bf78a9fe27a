//! # live-voice
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time bidirectional voice sessions with a conversational endpoint.
//!
//! `live-voice` captures the microphone via CPAL, streams it as 16kHz PCM to
//! a live model endpoint over a WebSocket, and plays the synthesized 24kHz
//! reply back without gaps. When the user talks over the assistant the
//! endpoint signals an interruption and playback stops at once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use live_voice::{Language, LiveVoice, SessionConfig};
//!
//! let mut session = LiveVoice::builder()
//!     .config(SessionConfig::default().with_api_key(std::env::var("GEMINI_API_KEY")?))
//!     .on_event(|e| tracing::debug!(?e, "session event"))
//!     .build()?;
//!
//! // Stop from anywhere, e.g. a ctrl-c handler
//! let control = session.control();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     control.disconnect();
//! });
//!
//! session.connect(Language::English).await?;
//! session.run().await;
//!
//! println!("{:?}", session.stats());
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **CPAL Threads**: High-priority input and output callbacks that never block
//! - **Ring Buffer**: Lock-free SPSC queue between the microphone and the capture bridge
//! - **Tokio Runtime**: Capture bridge, decode worker and transport tasks
//! - **Session Controller**: Single owner of all session state, fed by one inbox
//!
//! Outgoing audio is never held back by the network: capture submits
//! fire-and-forget, and chunks produced before the endpoint is ready are
//! queued and flushed in order.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod audio;
mod builder;
mod chunk;
mod config;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod session;
pub mod transport;

pub use audio::{
    default_input_device_name, default_output_device_name, list_input_devices,
    list_output_devices, AudioBackend, CpalBackend,
};
pub use builder::{LiveVoice, LiveVoiceBuilder};
pub use chunk::{AudioFrame, DecodedAudio, EncodedAudioChunk, PlaybackId};
pub use config::{
    Language, SessionConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_VOICE, FRAME_SIZE,
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
pub use error::{DecodeError, ErrorCategory, VoiceSessionError};
pub use event::{event_callback, EventCallback, SessionEvent};
pub use session::{
    Activity, PlaybackNotifier, ReleaseReport, SessionControl, SessionController, SessionState,
    SessionStats, SessionStatus, TransportEvents,
};
