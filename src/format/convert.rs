//! Sample format and channel conversion.

use crate::DecodeError;

/// Scale between `f32` samples and 16-bit PCM.
pub const PCM16_SCALE: f32 = 32768.0;

/// Converts an `f32` sample to 16-bit PCM.
///
/// Uses `sample * 32768` clamped to the i16 range, so 1.0 maps to 32767 and
/// -1.0 to -32768. Fractions are truncated toward zero, which keeps the
/// round trip within one quantization step.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).clamp(-32768.0, 32767.0) as i16
}

/// Converts a 16-bit PCM sample to `f32`.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM16_SCALE
}

/// Packs `f32` samples as 16-bit signed little-endian PCM bytes.
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| f32_to_pcm16(s).to_le_bytes())
        .collect()
}

/// Unpacks 16-bit signed little-endian PCM bytes into `f32` samples.
///
/// # Errors
///
/// Returns [`DecodeError::Empty`] for an empty payload and
/// [`DecodeError::OddLength`] if the bytes don't form whole samples.
pub fn decode_pcm16_le(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Downmixes interleaved multi-channel samples to mono by averaging.
///
/// A trailing partial frame is ignored. Mono input is returned unchanged.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.to_vec(),
        n => {
            let n = usize::from(n);
            interleaved
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}
