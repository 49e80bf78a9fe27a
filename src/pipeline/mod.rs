//! Audio pipeline components.
//!
//! Outgoing and inbound audio take separate paths through the session:
//!
//! ```text
//! CPAL Thread → Ring Buffer → Capture Bridge → Session → Transport
//! Transport → Session → Decode Worker → Session → Playback Scheduler → Mixer → CPAL Thread
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC queue, the device callback never blocks
//! - **Framer**: Downmixes, resamples and cuts exact frames
//! - **Capture Bridge**: Encodes frames and submits them in capture order
//! - **Decode Worker**: Decodes inbound payloads in receipt order
//! - **Playback Scheduler**: Places buffers back to back on the output clock
//! - **Interruption Handler**: Halts playback and invalidates in-flight decodes

mod capture;
mod decoder;
mod framer;
mod interrupt;
mod playback;

pub(crate) use capture::{spawn_capture_bridge, CaptureConfig, CaptureHandle};
pub(crate) use decoder::{spawn_decoder, DecodeJob, DecoderHandle};
pub use decoder::{DecodeOutcome, DecodeTicket};
pub use framer::Framer;
pub use interrupt::InterruptionHandler;
pub use playback::{PlaybackItem, PlaybackScheduler};
