//! Transport encoding of PCM audio.
//!
//! Outgoing frames are packed as 16-bit little-endian PCM and base64 encoded;
//! inbound payloads go the other way. Both sides tag the data with a mime
//! type of the form `audio/pcm;rate=N`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::convert::{decode_pcm16_le, encode_pcm16_le};
use crate::chunk::{AudioFrame, DecodedAudio, EncodedAudioChunk};
use crate::DecodeError;

const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Builds the mime tag for raw 16-bit PCM at `rate`.
pub fn pcm_mime(rate: u32) -> String {
    format!("{PCM_MIME_PREFIX};rate={rate}")
}

/// Extracts the `rate=` parameter from a PCM mime tag.
///
/// Returns `None` when the parameter is absent or malformed.
pub fn pcm_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|&rate| rate > 0)
}

/// Encodes a captured frame for sending.
pub fn encode_frame(frame: &AudioFrame, mime_type: &str) -> EncodedAudioChunk {
    EncodedAudioChunk {
        data: STANDARD.encode(encode_pcm16_le(&frame.samples)),
        mime_type: mime_type.to_string(),
        sequence: frame.sequence,
    }
}

/// Decodes an inbound base64 PCM payload.
///
/// The sample rate comes from the mime tag when it carries one, otherwise
/// `default_rate` is assumed. An empty mime tag is treated as PCM.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the mime type isn't PCM, the base64 is
/// invalid, or the bytes don't form whole 16-bit samples.
pub fn decode_payload(
    payload: &str,
    mime_type: &str,
    default_rate: u32,
) -> Result<DecodedAudio, DecodeError> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    if !essence.is_empty() && !essence.eq_ignore_ascii_case(PCM_MIME_PREFIX) {
        return Err(DecodeError::UnsupportedMime(mime_type.to_string()));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    let samples = decode_pcm16_le(&bytes)?;
    let rate = pcm_rate_from_mime(mime_type).unwrap_or(default_rate);

    Ok(DecodedAudio::new(samples, rate))
}
