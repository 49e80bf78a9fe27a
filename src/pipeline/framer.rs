//! Cuts the raw capture stream into fixed-size voice frames.

use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;

use crate::audio::InputFormat;
use crate::chunk::AudioFrame;
use crate::format::{downmix_to_mono, StreamResampler};

/// Reads interleaved device samples from the ring buffer and produces exact
/// `frame_size` mono frames at the target rate.
///
/// Leftover samples stay buffered until the next read, so no audio is lost
/// at frame boundaries and frame sequence numbers are contiguous.
pub struct Framer {
    consumer: HeapCons<f32>,
    channels: u16,
    resampler: StreamResampler,
    pending: Vec<f32>,
    frame_size: usize,
    target_rate: u32,
    next_sequence: u64,
    scratch: Vec<f32>,
}

impl Framer {
    /// Creates a framer over the read side of a capture ring buffer.
    pub fn new(
        consumer: HeapCons<f32>,
        format: InputFormat,
        target_rate: u32,
        frame_size: usize,
    ) -> Self {
        Self {
            consumer,
            channels: format.channels.max(1),
            resampler: StreamResampler::new(format.sample_rate, target_rate),
            pending: Vec::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
            target_rate,
            next_sequence: 0,
            scratch: Vec::new(),
        }
    }

    /// Returns the number of raw samples waiting in the ring buffer.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Returns the number of converted samples waiting for a full frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drains the ring buffer and returns every complete frame.
    pub fn read_frames(&mut self) -> Vec<AudioFrame> {
        // Only whole device frames, so channels never shift
        let channels = usize::from(self.channels);
        let whole = self.consumer.occupied_len() / channels * channels;
        if whole > 0 {
            self.scratch.resize(whole, 0.0);
            let read = self.consumer.pop_slice(&mut self.scratch);
            self.scratch.truncate(read);

            let mono = downmix_to_mono(&self.scratch, self.channels);
            let converted = self.resampler.process(&mono);
            self.pending.extend_from_slice(&converted);
        }

        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_size);
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(samples, self.target_rate, self.next_sequence));
            self.next_sequence += 1;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::{HeapProd, HeapRb};

    fn framer(rate: u32, channels: u16, frame_size: usize) -> (HeapProd<f32>, Framer) {
        let (producer, consumer) = HeapRb::<f32>::new(rate as usize * 4).split();
        let format = InputFormat {
            sample_rate: rate,
            channels,
        };
        (producer, Framer::new(consumer, format, 16000, frame_size))
    }

    #[test]
    fn test_exact_frames_at_target_rate() {
        let (mut producer, mut framer) = framer(16000, 1, 4096);
        producer.push_slice(&vec![0.1; 4096 * 2 + 100]);

        let frames = framer.read_frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4096 && f.sample_rate == 16000));
        assert_eq!(framer.pending(), 100);
    }

    #[test]
    fn test_not_enough_samples() {
        let (mut producer, mut framer) = framer(16000, 1, 4096);
        producer.push_slice(&vec![0.1; 4000]);

        assert!(framer.read_frames().is_empty());
        assert_eq!(framer.available(), 0);
        assert_eq!(framer.pending(), 4000);
    }

    #[test]
    fn test_leftovers_complete_next_frame() {
        let (mut producer, mut framer) = framer(16000, 1, 1000);
        producer.push_slice(&vec![0.1; 600]);
        assert!(framer.read_frames().is_empty());

        producer.push_slice(&vec![0.2; 600]);
        let frames = framer.read_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples[599], 0.1);
        assert_eq!(frames[0].samples[600], 0.2);
    }

    #[test]
    fn test_sequence_numbers_are_contiguous() {
        let (mut producer, mut framer) = framer(16000, 1, 100);
        producer.push_slice(&vec![0.0; 250]);
        let first = framer.read_frames();
        producer.push_slice(&vec![0.0; 150]);
        let second = framer.read_frames();

        let sequences: Vec<u64> = first.iter().chain(&second).map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_stereo_48k_is_downmixed_and_resampled() {
        let (mut producer, mut framer) = framer(48000, 2, 1600);
        // 100ms of 48kHz stereo -> 1600 mono samples at 16kHz
        producer.push_slice(&vec![0.25; 9600]);

        let frames = framer.read_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_partial_device_frame_waits() {
        let (mut producer, mut framer) = framer(16000, 2, 2);
        producer.push_slice(&[0.5, 0.5, 0.5]);
        framer.read_frames();
        // The odd sample stays in the ring until its partner arrives
        assert_eq!(framer.available(), 1);
    }
}
