//! Audio payloads flowing through a session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Converts a frame count at `sample_rate` into an exact duration.
///
/// Integer nanosecond arithmetic keeps back-to-back buffers contiguous
/// (0.5s + 0.3s is exactly 0.8s).
pub(crate) fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(frames) * 1_000_000_000 / u128::from(sample_rate);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Converts a duration into the nearest whole frame count at `sample_rate`.
pub(crate) fn duration_to_frames(duration: Duration, sample_rate: u32) -> u64 {
    let frames = (duration.as_nanos() * u128::from(sample_rate) + 500_000_000) / 1_000_000_000;
    u64::try_from(frames).unwrap_or(u64::MAX)
}

/// A fixed-size window of mono microphone samples.
///
/// Produced by the capture pipeline at a fixed cadence and consumed
/// immediately into an [`EncodedAudioChunk`].
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono samples in the range [-1.0, 1.0].
    pub samples: Vec<f32>,

    /// Sample rate in Hz (16000 for outgoing audio).
    pub sample_rate: u32,

    /// Position of this frame in capture order, starting at 0.
    pub sequence: u64,
}

impl AudioFrame {
    /// Creates a new frame.
    pub fn new(samples: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            sequence,
        }
    }

    /// Returns the duration of this frame.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.samples.len() as u64, self.sample_rate)
    }

    /// Returns the number of samples in this frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A transport-encoded audio frame ready to send.
///
/// `data` is base64 text of 16-bit little-endian PCM; `mime_type` names the
/// format and rate, e.g. `audio/pcm;rate=16000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    /// Base64-encoded PCM bytes.
    pub data: String,

    /// Format tag sent alongside the data.
    pub mime_type: String,

    /// Capture sequence of the frame this chunk was encoded from.
    pub sequence: u64,
}

/// Inbound speech decoded to mono `f32` samples.
///
/// Samples are `Arc`-wrapped so the playback engine can hold them without
/// copying.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in the range [-1.0, 1.0].
    pub samples: Arc<[f32]>,

    /// Sample rate in Hz (24000 for synthesized speech).
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Creates a decoded buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Creates a silent buffer of the given length, mostly useful in tests.
    pub fn silence(frames: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; frames], sample_rate)
    }

    /// Returns the playback duration of this buffer.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.samples.len() as u64, self.sample_rate)
    }

    /// Returns the number of frames in this buffer.
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Unique handle of a scheduled playback buffer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub(crate) u64);

impl PlaybackId {
    /// Returns the numeric value of this handle.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
