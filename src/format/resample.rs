//! Sample rate conversion.
//!
//! This module provides basic resampling using linear interpolation, which is
//! fast and adequate for speech. Two flavours are provided:
//!
//! - [`resample`] converts a complete buffer (inbound speech for playback)
//! - [`StreamResampler`] converts a continuous stream delivered in pieces
//!   (microphone capture), carrying the interpolation phase across calls so
//!   that chunk boundaries don't click or drift

/// Resamples a complete mono buffer from one sample rate to another.
///
/// Uses linear interpolation. Returns an empty buffer if either rate is zero.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < samples.len() {
            let s1 = samples[src_idx];
            let s2 = samples[src_idx + 1];
            s1 + (s2 - s1) * frac
        } else {
            // Past the last interpolation pair, hold the final sample
            samples[samples.len() - 1]
        };

        output.push(sample);
    }

    output
}

/// Streaming linear resampler for mono audio.
///
/// Input arrives in arbitrarily sized pieces; the resampler remembers the
/// last input sample and the fractional read position, so the output is the
/// same as resampling the concatenated stream in one go.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next input piece.
    /// `-1.0..0.0` means "between the previous piece's last sample and this one's first".
    position: f64,
    last: Option<f32>,
}

impl StreamResampler {
    /// Creates a resampler from `from_rate` to `to_rate`.
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if to_rate == 0 {
            0.0
        } else {
            f64::from(from_rate) / f64::from(to_rate)
        };
        Self {
            from_rate,
            to_rate,
            step,
            position: 0.0,
            last: None,
        }
    }

    /// Returns `true` if input passes through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resamples the next piece of the stream.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() || self.step <= 0.0 || self.from_rate == 0 {
            return Vec::new();
        }

        let len = input.len() as f64;
        let mut output = Vec::with_capacity((len / self.step).ceil() as usize + 1);

        // Each output sample needs input[idx] and input[idx + 1]
        while self.position < len - 1.0 {
            let idx = self.position.floor();
            let frac = (self.position - idx) as f32;
            let s1 = if idx < 0.0 {
                self.last.unwrap_or(input[0])
            } else {
                input[idx as usize]
            };
            let s2 = input[(idx + 1.0) as usize];
            output.push(s1 + (s2 - s1) * frac);
            self.position += self.step;
        }

        self.position -= len;
        self.last = input.last().copied();
        output
    }

    /// Forgets the carried phase, e.g. after the stream restarts.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 24000, 24000), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 24000, 48000).is_empty());
    }

    #[test]
    fn test_resample_zero_rates() {
        assert!(resample(&[0.5], 24000, 0).is_empty());
        assert!(resample(&[0.5], 0, 24000).is_empty());
    }

    #[test]
    fn test_resample_upsample_doubles_length() {
        let samples = vec![0.0f32, 0.5, 1.0];
        let resampled = resample(&samples, 24000, 48000);
        assert_eq!(resampled.len(), 6);
        // Original samples land on even indices
        assert_eq!(resampled[0], 0.0);
        assert_eq!(resampled[2], 0.5);
        assert_eq!(resampled[4], 1.0);
        // Interpolated midpoint
        assert!((resampled[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_resample_downsample() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        assert_eq!(resample(&samples, 48000, 16000).len(), 160);
    }

    #[test]
    fn test_stream_resampler_passthrough() {
        let mut resampler = StreamResampler::new(16000, 16000);
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn test_stream_resampler_downsample_exact_count() {
        let mut resampler = StreamResampler::new(48000, 16000);
        let input = vec![0.0f32; 4800];
        assert_eq!(resampler.process(&input).len(), 1600);
        assert_eq!(resampler.process(&input).len(), 1600);
    }

    #[test]
    fn test_stream_resampler_matches_single_pass() {
        let input: Vec<f32> = (0..441).map(|i| (i as f32 * 0.05).sin()).collect();

        let mut whole = StreamResampler::new(44100, 16000);
        let expected = whole.process(&input);

        let mut pieces = StreamResampler::new(44100, 16000);
        let mut actual = Vec::new();
        for piece in input.chunks(37) {
            actual.extend(pieces.process(piece));
        }

        assert_eq!(actual.len(), expected.len());
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_stream_resampler_no_drift_over_many_pieces() {
        let mut resampler = StreamResampler::new(44100, 16000);
        let piece = vec![0.0f32; 441];
        let total: usize = (0..1000).map(|_| resampler.process(&piece).len()).sum();
        // 441000 samples at 44.1kHz = 10s = 160000 samples at 16kHz
        assert!((159_999..=160_001).contains(&total), "got {total}");
    }

    #[test]
    fn test_stream_resampler_reset() {
        let mut resampler = StreamResampler::new(48000, 16000);
        resampler.process(&[0.5; 10]);
        resampler.reset();
        let out = resampler.process(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(out[0], 0.0);
    }
}
