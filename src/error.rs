//! Error types for live-voice.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`VoiceSessionError`]): end the session or prevent it from starting
//! - **Local errors** ([`DecodeError`]): one inbound audio chunk is dropped, the session continues

use std::time::Duration;

use crate::session::SessionState;

/// Stable classification of session failures, suitable for mapping to
/// user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Microphone access was refused by the host platform.
    PermissionDenied,
    /// The channel failed to open, timed out, or closed before the session was active.
    ConnectionFailure,
    /// The transport failed while the session was active.
    MidSessionError,
    /// A received payload could not be decoded into audio.
    DecodeFailure,
    /// An audio device could not be opened or used.
    Device,
    /// The API was used incorrectly (bad state or configuration).
    Usage,
}

/// Errors that end a voice session or prevent it from starting.
///
/// Every variant that is returned from
/// [`SessionController::connect()`](crate::SessionController::connect) leaves
/// the session in a terminal state with all acquired resources released.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceSessionError {
    /// Permission to capture from the microphone was denied.
    #[error("microphone permission denied (check OS privacy settings)")]
    PermissionDenied,

    /// The channel to the remote endpoint could not be opened or closed early.
    #[error("connection failed: {reason}")]
    ConnectionFailure {
        /// Description of what went wrong.
        reason: String,
    },

    /// The channel did not open, or the endpoint did not acknowledge the
    /// setup, within the configured timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The transport reported an error while the session was active.
    #[error("session error: {reason}")]
    MidSession {
        /// Description of the transport error.
        reason: String,
    },

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultInputDevice,

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultOutputDevice,

    /// Another live session already holds the audio device.
    #[error("audio device is already in use by another session")]
    DeviceBusy,

    /// The device's sample format is not supported.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// The operation is not allowed in the current session state.
    #[error("cannot {action} while session is {state}")]
    InvalidState {
        /// The rejected operation.
        action: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// The session configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A message could not be encoded for the wire.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl VoiceSessionError {
    /// Creates a connection failure with the given reason.
    pub fn connection_failure(reason: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            reason: reason.into(),
        }
    }

    /// Creates a mid-session error with the given reason.
    pub fn mid_session(reason: impl Into<String>) -> Self {
        Self::MidSession {
            reason: reason.into(),
        }
    }

    /// Creates a backend error from anything displayable.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendError(err.to_string())
    }

    /// Returns the stable category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied => ErrorCategory::PermissionDenied,
            Self::ConnectionFailure { .. } | Self::ConnectTimeout(_) | Self::Protocol(_) => {
                ErrorCategory::ConnectionFailure
            }
            Self::MidSession { .. } => ErrorCategory::MidSessionError,
            Self::DeviceNotFound { .. }
            | Self::NoDefaultInputDevice
            | Self::NoDefaultOutputDevice
            | Self::DeviceBusy
            | Self::UnsupportedFormat { .. }
            | Self::BackendError(_) => ErrorCategory::Device,
            Self::InvalidState { .. } | Self::InvalidConfig(_) => ErrorCategory::Usage,
        }
    }
}

/// Errors decoding a single inbound audio payload.
///
/// These never end the session: the chunk is dropped, a
/// [`SessionEvent::DecodeFailed`](crate::SessionEvent::DecodeFailed) is
/// emitted, and playback continues with the next chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The transport encoding was not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// The payload does not hold a whole number of 16-bit samples.
    #[error("PCM payload has odd length {0}")]
    OddLength(usize),

    /// The payload decoded to zero samples.
    #[error("empty audio payload")]
    Empty,

    /// The payload is tagged with a format other than raw PCM.
    #[error("unsupported audio format: {0}")]
    UnsupportedMime(String),
}

impl DecodeError {
    /// Decode errors are always local failures.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::DecodeFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_display() {
        let err = VoiceSessionError::PermissionDenied;
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(err.category(), ErrorCategory::PermissionDenied);
    }

    #[test]
    fn test_connection_failure_helper() {
        let err = VoiceSessionError::connection_failure("handshake rejected");
        assert_eq!(err.to_string(), "connection failed: handshake rejected");
        assert_eq!(err.category(), ErrorCategory::ConnectionFailure);
    }

    #[test]
    fn test_timeout_is_connection_failure() {
        let err = VoiceSessionError::ConnectTimeout(Duration::from_secs(5));
        assert_eq!(err.category(), ErrorCategory::ConnectionFailure);
    }

    #[test]
    fn test_mid_session_category() {
        let err = VoiceSessionError::mid_session("socket reset");
        assert_eq!(err.to_string(), "session error: socket reset");
        assert_eq!(err.category(), ErrorCategory::MidSessionError);
    }

    #[test]
    fn test_invalid_state_display() {
        let err = VoiceSessionError::InvalidState {
            action: "connect",
            state: SessionState::Active,
        };
        assert_eq!(err.to_string(), "cannot connect while session is active");
        assert_eq!(err.category(), ErrorCategory::Usage);
    }

    #[test]
    fn test_device_errors_share_category() {
        assert_eq!(VoiceSessionError::DeviceBusy.category(), ErrorCategory::Device);
        assert_eq!(
            VoiceSessionError::backend("stream invalidated").category(),
            ErrorCategory::Device
        );
    }

    #[test]
    fn test_decode_error_display() {
        assert_eq!(
            DecodeError::OddLength(3).to_string(),
            "PCM payload has odd length 3"
        );
        assert_eq!(DecodeError::Empty.category(), ErrorCategory::DecodeFailure);
    }
}
