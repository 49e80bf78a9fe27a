//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Sample format conversion (f32 ↔ 16-bit PCM)
//! - Channel conversion (multi-channel → mono)
//! - Sample rate conversion (resampling)
//! - Transport encoding (PCM ↔ base64 with mime tags)

mod codec;
mod convert;
mod resample;

pub use codec::{decode_payload, encode_frame, pcm_mime, pcm_rate_from_mime};
pub use convert::{
    decode_pcm16_le, downmix_to_mono, encode_pcm16_le, f32_to_pcm16, pcm16_to_f32, PCM16_SCALE,
};
pub use resample::{resample, StreamResampler};
