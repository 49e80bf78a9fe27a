//! Mock audio devices for testing without hardware.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{AudioBackend, DeviceLease, DeviceLeases, InputDevice, InputFormat, PlaybackEngine};
use crate::chunk::{DecodedAudio, PlaybackId};
use crate::session::PlaybackNotifier;
use crate::VoiceSessionError;

/// A mock audio source that generates synthetic audio for testing.
///
/// Samples are interleaved `f32`, the same layout an [`InputDevice`] pushes
/// into its ring buffer.
///
/// # Example
///
/// ```
/// use live_voice::audio::MockSource;
///
/// let mut mock = MockSource::new(16000, 1);
///
/// // Generate 100ms of silence
/// mock.generate_silence(100);
///
/// // Generate 100ms of a 440Hz sine wave
/// mock.generate_sine(440.0, 100);
///
/// // Get the generated samples
/// let samples = mock.take_samples();
/// assert_eq!(samples.len(), 3200);
/// ```
pub struct MockSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl MockSource {
    /// Creates a new mock source with the given format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
        }
    }

    /// Creates a mock source in the outgoing voice format (16kHz mono).
    pub fn voice() -> Self {
        Self::new(crate::config::INPUT_SAMPLE_RATE, 1)
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Generates silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        self.samples.extend(std::iter::repeat(0.0f32).take(num_samples));
    }

    /// Generates a sine wave at the given frequency for the given duration.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) {
        let num_frames = self.samples_for_duration(duration_ms) / usize::from(self.channels.max(1));
        let sample_rate = f64::from(self.sample_rate);

        for i in 0..num_frames {
            let t = i as f64 / sample_rate;
            let sample = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.5;

            // Write same sample to all channels
            for _ in 0..self.channels {
                self.samples.push(sample);
            }
        }
    }

    /// Generates white noise with the given peak amplitude.
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f32) {
        let num_samples = self.samples_for_duration(duration_ms);

        // Simple LCG for deterministic "random" noise
        let mut seed: u32 = 12345;
        for _ in 0..num_samples {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let unit = f32::from((seed >> 16) as u16) / 32768.0 - 1.0;
            self.samples.push(unit * amplitude);
        }
    }

    /// Adds raw samples directly.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Takes all accumulated samples, clearing the internal buffer.
    pub fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    /// Returns a reference to the accumulated samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the duration of accumulated samples.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        crate::chunk::frames_to_duration(frames as u64, self.sample_rate)
    }

    /// Creates a ring buffer consumer filled with the accumulated samples.
    pub fn into_ring_buffer(self) -> HeapCons<f32> {
        let capacity = self.samples.len().max(1024);
        let (mut producer, consumer) = HeapRb::<f32>::new(capacity).split();
        producer.push_slice(&self.samples);
        consumer
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        let frames = (u64::from(self.sample_rate) * duration_ms / 1000) as usize;
        frames * usize::from(self.channels)
    }
}

/// A buffer handed to the mock speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPlayback {
    /// Handle the session assigned.
    pub id: PlaybackId,
    /// Requested start on the output clock.
    pub start: Duration,
    /// Length of the buffer.
    pub duration: Duration,
}

impl MockPlayback {
    /// Output clock time at which this buffer ends.
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

struct MockState {
    input_format: InputFormat,
    deny_permission: bool,
    output_failure: Option<String>,
    producer: Option<HeapProd<f32>>,
    notifier: Option<PlaybackNotifier>,
    clock: Duration,
    active: Vec<MockPlayback>,
    history: Vec<MockPlayback>,
    input_opens: usize,
    input_closes: usize,
    stream_stops: usize,
    output_opens: usize,
    output_closes: usize,
    stop_all_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            input_format: InputFormat {
                sample_rate: crate::config::INPUT_SAMPLE_RATE,
                channels: 1,
            },
            deny_permission: false,
            output_failure: None,
            producer: None,
            notifier: None,
            clock: Duration::ZERO,
            active: Vec::new(),
            history: Vec::new(),
            input_opens: 0,
            input_closes: 0,
            stream_stops: 0,
            output_opens: 0,
            output_closes: 0,
            stop_all_calls: 0,
        }
    }
}

/// Audio backend with scripted devices and a manual output clock.
///
/// Clones share the same devices, so a test keeps one clone to drive input,
/// advance the clock and inspect what the session did.
///
/// # Example
///
/// ```
/// use live_voice::audio::MockAudioBackend;
/// use std::time::Duration;
///
/// let backend = MockAudioBackend::new();
/// backend.advance(Duration::from_millis(250));
/// assert_eq!(backend.now(), Duration::from_millis(250));
/// assert_eq!(backend.input_opens(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockAudioBackend {
    state: Arc<Mutex<MockState>>,
    leases: DeviceLeases,
}

impl MockAudioBackend {
    /// Creates a backend whose microphone delivers 16kHz mono.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the native format of the mock microphone.
    #[must_use]
    pub fn with_input_format(self, sample_rate: u32, channels: u16) -> Self {
        self.state.lock().input_format = InputFormat {
            sample_rate,
            channels,
        };
        self
    }

    /// Makes the next microphone opens fail as if the user refused access.
    pub fn deny_permission(&self) {
        self.state.lock().deny_permission = true;
    }

    /// Makes the next speaker opens fail with a backend error.
    pub fn fail_output(&self, reason: impl Into<String>) {
        self.state.lock().output_failure = Some(reason.into());
    }

    /// Pushes interleaved samples into the microphone's ring buffer.
    ///
    /// Returns how many samples were accepted (zero when no microphone is open).
    pub fn push_input(&self, samples: &[f32]) -> usize {
        self.state
            .lock()
            .producer
            .as_mut()
            .map_or(0, |producer| producer.push_slice(samples))
    }

    /// Pushes everything a [`MockSource`] has generated.
    pub fn push_source(&self, mut source: MockSource) -> usize {
        self.push_input(&source.take_samples())
    }

    /// Current output clock.
    pub fn now(&self) -> Duration {
        self.state.lock().clock
    }

    /// Advances the output clock, finishing every buffer that ends by then.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.clock += by;
        let now = state.clock;

        let mut done: Vec<MockPlayback> = Vec::new();
        state.active.retain(|item| {
            let finished = item.end() <= now;
            if finished {
                done.push(*item);
            }
            !finished
        });
        done.sort_by_key(MockPlayback::end);

        if let Some(notifier) = state.notifier.as_ref() {
            for item in done {
                notifier.finished(item.id);
            }
        }
    }

    /// Buffers currently scheduled or playing.
    pub fn active(&self) -> Vec<MockPlayback> {
        self.state.lock().active.clone()
    }

    /// Every buffer ever handed to the speaker, in scheduling order.
    pub fn scheduled(&self) -> Vec<MockPlayback> {
        self.state.lock().history.clone()
    }

    /// Number of successful microphone opens.
    pub fn input_opens(&self) -> usize {
        self.state.lock().input_opens
    }

    /// Number of microphone closes that released the device.
    pub fn input_closes(&self) -> usize {
        self.state.lock().input_closes
    }

    /// Number of times a running microphone stream was stopped.
    pub fn stream_stops(&self) -> usize {
        self.state.lock().stream_stops
    }

    /// Number of successful speaker opens.
    pub fn output_opens(&self) -> usize {
        self.state.lock().output_opens
    }

    /// Number of speaker closes that released the device.
    pub fn output_closes(&self) -> usize {
        self.state.lock().output_closes
    }

    /// Number of `stop_all` calls on the speaker.
    pub fn stop_all_calls(&self) -> usize {
        self.state.lock().stop_all_calls
    }

    /// Lease slots of this backend.
    pub fn leases(&self) -> &DeviceLeases {
        &self.leases
    }
}

impl AudioBackend for MockAudioBackend {
    fn open_input(
        &self,
        _device: Option<&str>,
        buffer: Duration,
    ) -> Result<Box<dyn InputDevice>, VoiceSessionError> {
        let lease = self.leases.acquire_input()?;
        let mut state = self.state.lock();
        if state.deny_permission {
            return Err(VoiceSessionError::PermissionDenied);
        }

        let format = state.input_format;
        let capacity = ((f64::from(format.sample_rate) * buffer.as_secs_f64()) as usize).max(1)
            * usize::from(format.channels.max(1));
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        state.producer = Some(producer);
        state.input_opens += 1;

        Ok(Box::new(MockInput {
            state: Arc::clone(&self.state),
            format,
            consumer: Some(consumer),
            running: false,
            lease: Some(lease),
        }))
    }

    fn open_output(
        &self,
        _device: Option<&str>,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackEngine>, VoiceSessionError> {
        let lease = self.leases.acquire_output()?;
        let mut state = self.state.lock();
        if let Some(reason) = state.output_failure.clone() {
            return Err(VoiceSessionError::BackendError(reason));
        }
        state.notifier = Some(notifier);
        state.output_opens += 1;

        Ok(Box::new(MockOutput {
            state: Arc::clone(&self.state),
            lease: Some(lease),
        }))
    }
}

struct MockInput {
    state: Arc<Mutex<MockState>>,
    format: InputFormat,
    consumer: Option<HeapCons<f32>>,
    running: bool,
    lease: Option<DeviceLease>,
}

impl InputDevice for MockInput {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn start(&mut self) -> Result<HeapCons<f32>, VoiceSessionError> {
        let consumer = self.consumer.take().ok_or_else(|| {
            VoiceSessionError::BackendError("input stream already started or closed".into())
        })?;
        self.running = true;
        Ok(consumer)
    }

    fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.state.lock().stream_stops += 1;
        true
    }

    fn close(&mut self) -> bool {
        if self.lease.take().is_none() {
            return false;
        }
        self.running = false;
        self.consumer = None;
        let mut state = self.state.lock();
        state.producer = None;
        state.input_closes += 1;
        true
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

struct MockOutput {
    state: Arc<Mutex<MockState>>,
    lease: Option<DeviceLease>,
}

impl PlaybackEngine for MockOutput {
    fn now(&self) -> Duration {
        self.state.lock().clock
    }

    fn play(
        &mut self,
        id: PlaybackId,
        audio: DecodedAudio,
        start: Duration,
    ) -> Result<(), VoiceSessionError> {
        if self.is_closed() {
            return Err(VoiceSessionError::BackendError(
                "output device is closed".into(),
            ));
        }
        let mut state = self.state.lock();
        let item = MockPlayback {
            id,
            start: start.max(state.clock),
            duration: audio.duration(),
        };
        state.active.push(item);
        state.history.push(item);
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) -> bool {
        let mut state = self.state.lock();
        let before = state.active.len();
        state.active.retain(|item| item.id != id);
        state.active.len() != before
    }

    fn stop_all(&mut self) -> usize {
        let mut state = self.state.lock();
        state.stop_all_calls += 1;
        let stopped = state.active.len();
        state.active.clear();
        stopped
    }

    fn close(&mut self) -> bool {
        if self.lease.take().is_none() {
            return false;
        }
        let mut state = self.state.lock();
        state.active.clear();
        state.notifier = None;
        state.output_closes += 1;
        true
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{inbox, SessionInput};
    use ringbuf::traits::Consumer;

    #[test]
    fn test_mock_source_silence() {
        let mut mock = MockSource::new(16000, 1);
        mock.generate_silence(100);

        let samples = mock.take_samples();
        assert_eq!(samples.len(), 1600); // 16000 * 0.1 = 1600
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mock_source_sine() {
        let mut mock = MockSource::new(16000, 1);
        mock.generate_sine(440.0, 100);

        let samples = mock.take_samples();
        assert_eq!(samples.len(), 1600);

        // Sine wave should have positive and negative values
        assert!(samples.iter().any(|&s| s > 0.0));
        assert!(samples.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_mock_source_stereo() {
        let mut mock = MockSource::new(48000, 2);
        mock.generate_silence(100);

        // 48000 * 0.1 * 2 channels = 9600
        assert_eq!(mock.take_samples().len(), 9600);
    }

    #[test]
    fn test_mock_source_noise_is_bounded() {
        let mut mock = MockSource::voice();
        mock.generate_noise(50, 0.25);
        assert!(mock.samples().iter().all(|s| s.abs() <= 0.25));
        assert!(mock.samples().iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_mock_source_duration() {
        let mut mock = MockSource::voice();
        mock.generate_silence(500);

        assert_eq!(mock.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_mock_source_ring_buffer() {
        let mut mock = MockSource::new(16000, 1);
        mock.add_samples(&[0.1, 0.2, 0.3]);

        let mut consumer = mock.into_ring_buffer();

        let mut output = Vec::new();
        while let Some(sample) = consumer.try_pop() {
            output.push(sample);
        }

        assert_eq!(output, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_mock_input_delivers_pushed_samples() {
        let backend = MockAudioBackend::new();
        let mut input = backend
            .open_input(None, Duration::from_secs(1))
            .unwrap();
        let mut consumer = input.start().unwrap();

        assert_eq!(backend.push_input(&[0.5, -0.5]), 2);
        assert_eq!(consumer.try_pop(), Some(0.5));
        assert_eq!(consumer.try_pop(), Some(-0.5));
    }

    #[test]
    fn test_mock_input_stop_and_close_are_idempotent() {
        let backend = MockAudioBackend::new();
        let mut input = backend
            .open_input(None, Duration::from_secs(1))
            .unwrap();
        let _consumer = input.start().unwrap();

        assert!(input.stop());
        assert!(!input.stop());
        assert!(input.close());
        assert!(!input.close());
        assert_eq!(backend.stream_stops(), 1);
        assert_eq!(backend.input_closes(), 1);
        assert_eq!(backend.push_input(&[0.1]), 0);
    }

    #[test]
    fn test_mock_permission_denied_releases_lease() {
        let backend = MockAudioBackend::new();
        backend.deny_permission();
        assert!(matches!(
            backend.open_input(None, Duration::from_secs(1)),
            Err(VoiceSessionError::PermissionDenied)
        ));
        assert!(!backend.leases().input_held());
        assert_eq!(backend.input_opens(), 0);
    }

    #[test]
    fn test_mock_output_clock_finishes_buffers() {
        let backend = MockAudioBackend::new();
        let (tx, mut rx) = inbox();
        let mut output = backend
            .open_output(None, PlaybackNotifier::new(tx))
            .unwrap();

        output
            .play(PlaybackId(0), DecodedAudio::silence(2400, 24000), Duration::ZERO)
            .unwrap();
        output
            .play(
                PlaybackId(1),
                DecodedAudio::silence(2400, 24000),
                Duration::from_millis(100),
            )
            .unwrap();

        backend.advance(Duration::from_millis(100));
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionInput::PlaybackFinished(PlaybackId(0)))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(backend.active().len(), 1);

        backend.advance(Duration::from_millis(100));
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionInput::PlaybackFinished(PlaybackId(1)))
        ));
    }

    #[test]
    fn test_mock_second_open_is_busy() {
        let backend = MockAudioBackend::new();
        let (tx, _rx) = inbox();
        let mut first = backend
            .open_output(None, PlaybackNotifier::new(tx.clone()))
            .unwrap();
        assert!(matches!(
            backend.open_output(None, PlaybackNotifier::new(tx.clone())),
            Err(VoiceSessionError::DeviceBusy)
        ));

        first.close();
        assert!(backend.open_output(None, PlaybackNotifier::new(tx)).is_ok());
    }
}
