//! Gapless playback scheduling on the output clock.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::audio::PlaybackEngine;
use crate::chunk::{DecodedAudio, PlaybackId};
use crate::VoiceSessionError;

/// A buffer owned by the scheduler from scheduling until it finishes or is stopped.
#[derive(Debug, Clone)]
pub struct PlaybackItem {
    /// Unique handle, used for cancellation.
    pub id: PlaybackId,
    /// Start offset on the output clock.
    pub start: Duration,
    /// The decoded buffer.
    pub audio: DecodedAudio,
}

impl PlaybackItem {
    /// Length of the buffer.
    pub fn duration(&self) -> Duration {
        self.audio.duration()
    }

    /// Output clock time at which the buffer ends.
    pub fn end(&self) -> Duration {
        self.start + self.duration()
    }
}

/// Queues decoded buffers back to back on the output clock.
///
/// Each buffer starts at `max(next_start, now)` and pushes `next_start` to
/// its end at scheduling time, so consecutive buffers neither overlap nor
/// leave gaps unless the stream fell behind real time.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: Duration,
    active: BTreeMap<PlaybackId, PlaybackItem>,
    next_id: u64,
}

impl PlaybackScheduler {
    /// Creates an empty scheduler with the baseline at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start offset the next buffer will get if the clock hasn't passed it.
    pub fn next_start(&self) -> Duration {
        self.next_start
    }

    /// Returns `true` whenever a buffer is scheduled or playing.
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    /// Number of buffers scheduled or playing.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if `id` is scheduled or playing.
    pub fn contains(&self, id: PlaybackId) -> bool {
        self.active.contains_key(&id)
    }

    /// Schedules `audio` right after everything already queued.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if it refused the buffer; the schedule is
    /// left unchanged in that case.
    pub fn schedule(
        &mut self,
        engine: &mut dyn PlaybackEngine,
        audio: DecodedAudio,
    ) -> Result<PlaybackItem, VoiceSessionError> {
        let start = self.next_start.max(engine.now());
        let id = PlaybackId(self.next_id);

        engine.play(id, audio.clone(), start)?;

        self.next_id += 1;
        let item = PlaybackItem { id, start, audio };
        self.next_start = item.end();
        self.active.insert(id, item.clone());
        Ok(item)
    }

    /// Removes a buffer that finished playing.
    pub fn finished(&mut self, id: PlaybackId) -> Option<PlaybackItem> {
        self.active.remove(&id)
    }

    /// Stops every active buffer and moves the baseline to the current clock.
    ///
    /// Returns how many buffers were stopped.
    pub fn halt(&mut self, engine: &mut dyn PlaybackEngine) -> usize {
        let stopped = self.active.len();
        engine.stop_all();
        self.active.clear();
        self.next_start = engine.now();
        stopped
    }

    /// Forgets all buffers without touching an engine (after the engine is gone).
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, MockAudioBackend};
    use crate::session::{inbox, PlaybackNotifier};

    fn engine(backend: &MockAudioBackend) -> Box<dyn PlaybackEngine> {
        let (tx, _rx) = inbox();
        backend.open_output(None, PlaybackNotifier::new(tx)).unwrap()
    }

    fn secs(seconds: f32) -> DecodedAudio {
        DecodedAudio::silence((24000.0 * seconds) as usize, 24000)
    }

    #[test]
    fn test_back_to_back_buffers() {
        let backend = MockAudioBackend::new();
        let mut engine = engine(&backend);
        let mut scheduler = PlaybackScheduler::new();

        let first = scheduler.schedule(engine.as_mut(), secs(0.5)).unwrap();
        let second = scheduler.schedule(engine.as_mut(), secs(0.3)).unwrap();

        assert_eq!(first.start, Duration::ZERO);
        assert_eq!(second.start, Duration::from_millis(500));
        assert_eq!(scheduler.next_start(), Duration::from_millis(800));
        assert!(scheduler.is_speaking());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_late_buffer_starts_now() {
        let backend = MockAudioBackend::new();
        let mut engine = engine(&backend);
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(engine.as_mut(), secs(0.1)).unwrap();
        backend.advance(Duration::from_millis(400));

        let late = scheduler.schedule(engine.as_mut(), secs(0.1)).unwrap();
        assert_eq!(late.start, Duration::from_millis(400));
        assert_eq!(scheduler.next_start(), Duration::from_millis(500));
    }

    #[test]
    fn test_finished_leaves_active_set() {
        let backend = MockAudioBackend::new();
        let mut engine = engine(&backend);
        let mut scheduler = PlaybackScheduler::new();

        let item = scheduler.schedule(engine.as_mut(), secs(0.1)).unwrap();
        assert!(scheduler.finished(item.id).is_some());
        assert!(!scheduler.is_speaking());
        assert!(scheduler.finished(item.id).is_none());
    }

    #[test]
    fn test_halt_resets_to_clock() {
        let backend = MockAudioBackend::new();
        let mut engine = engine(&backend);
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(engine.as_mut(), secs(0.5)).unwrap();
        scheduler.schedule(engine.as_mut(), secs(0.5)).unwrap();
        backend.advance(Duration::from_millis(200));

        assert_eq!(scheduler.halt(engine.as_mut()), 2);
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.next_start(), Duration::from_millis(200));
        assert!(backend.active().is_empty());

        let next = scheduler.schedule(engine.as_mut(), secs(0.1)).unwrap();
        assert_eq!(next.start, Duration::from_millis(200));
    }

    #[test]
    fn test_rejected_buffer_leaves_schedule_unchanged() {
        let backend = MockAudioBackend::new();
        let mut engine = engine(&backend);
        let mut scheduler = PlaybackScheduler::new();
        engine.close();

        assert!(scheduler.schedule(engine.as_mut(), secs(0.1)).is_err());
        assert_eq!(scheduler.next_start(), Duration::ZERO);
        assert!(!scheduler.is_speaking());
    }
}
