//! Sample-accurate mixer shared between a playback engine and its device callback.
//!
//! Voices are positioned on an absolute frame clock. The device callback
//! renders the next block, advances the clock by exactly the frames it wrote
//! and reports voices that ran out. Scheduling from the session side only
//! touches the voice list, so a buffer queued to start at frame N starts at
//! frame N regardless of when the callback next runs.
//!
//! A block rendered while the session side holds the voice list plays
//! silence and leaves the clock where it was, so every queued voice shifts
//! by that block instead of losing frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::chunk::{duration_to_frames, frames_to_duration, PlaybackId};
use crate::session::PlaybackNotifier;

struct Voice {
    id: PlaybackId,
    samples: Arc<[f32]>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

pub(crate) struct Mixer {
    voices: Mutex<Vec<Voice>>,
    /// Frames of voice timeline rendered since the stream started.
    clock: AtomicU64,
    /// Blocks rendered as silence because the voice list was busy.
    contended: AtomicU64,
    sample_rate: u32,
    channels: u16,
    notifier: PlaybackNotifier,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16, notifier: PlaybackNotifier) -> Self {
        Self {
            voices: Mutex::new(Vec::new()),
            clock: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            sample_rate,
            channels: channels.max(1),
            notifier,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn now(&self) -> Duration {
        frames_to_duration(self.clock.load(Ordering::Acquire), self.sample_rate)
    }

    /// Adds mono `samples` (already at the mixer rate) starting at `start`.
    pub fn add(&self, id: PlaybackId, samples: Arc<[f32]>, start: Duration) {
        let mut voices = self.voices.lock();
        let start_frame =
            duration_to_frames(start, self.sample_rate).max(self.clock.load(Ordering::Acquire));
        voices.push(Voice {
            id,
            samples,
            start_frame,
        });
    }

    pub fn remove(&self, id: PlaybackId) -> bool {
        let mut voices = self.voices.lock();
        let before = voices.len();
        voices.retain(|voice| voice.id != id);
        voices.len() != before
    }

    pub fn clear(&self) -> usize {
        let mut voices = self.voices.lock();
        let stopped = voices.len();
        voices.clear();
        stopped
    }

    /// Number of blocks that were held back because the voice list was busy.
    pub fn contended_blocks(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.voices.lock().len()
    }

    /// Renders the next block of interleaved output. Runs on the audio thread.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = usize::from(self.channels);
        let frames = (out.len() / channels) as u64;
        let block_start = self.clock.load(Ordering::Acquire);
        let block_end = block_start + frames;

        // Never wait for the session thread here
        let Some(mut voices) = self.voices.try_lock() else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            return;
        };

        for voice in voices.iter() {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                let offset = (frame - block_start) as usize * channels;
                for slot in &mut out[offset..offset + channels] {
                    *slot += sample;
                }
            }
        }

        voices.retain(|voice| {
            let done = voice.end_frame() <= block_end;
            if done {
                self.notifier.finished(voice.id);
            }
            !done
        });

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.clock.store(block_end, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{inbox, SessionInput};

    fn mixer(channels: u16) -> (Mixer, crate::session::InboxReceiver) {
        let (tx, rx) = inbox();
        (Mixer::new(1000, channels, PlaybackNotifier::new(tx)), rx)
    }

    fn finished(rx: &mut crate::session::InboxReceiver) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Ok(SessionInput::PlaybackFinished(id)) = rx.try_recv() {
            ids.push(id.get());
        }
        ids
    }

    #[test]
    fn test_clock_advances_by_rendered_frames() {
        let (mixer, _rx) = mixer(2);
        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        assert_eq!(mixer.now(), Duration::from_millis(10));
    }

    #[test]
    fn test_voice_starts_at_exact_frame() {
        let (mixer, _rx) = mixer(1);
        mixer.add(PlaybackId(1), vec![0.5; 4].into(), Duration::from_millis(3));

        let mut out = vec![0.0; 8];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_back_to_back_voices_are_gapless() {
        let (mixer, mut rx) = mixer(1);
        mixer.add(PlaybackId(1), vec![0.25; 5].into(), Duration::ZERO);
        mixer.add(PlaybackId(2), vec![0.5; 3].into(), Duration::from_millis(5));

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.25; 4]);
        assert!(finished(&mut rx).is_empty());

        mixer.render(&mut out);
        assert_eq!(out, vec![0.25, 0.5, 0.5, 0.5]);
        assert_eq!(finished(&mut rx), vec![1, 2]);
        assert_eq!(mixer.active(), 0);
    }

    #[test]
    fn test_past_start_plays_immediately() {
        let (mixer, _rx) = mixer(1);
        let mut out = vec![0.0; 10];
        mixer.render(&mut out);

        mixer.add(PlaybackId(1), vec![0.5; 2].into(), Duration::ZERO);
        let mut out = vec![0.0; 3];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_stereo_duplicates_mono() {
        let (mixer, _rx) = mixer(2);
        mixer.add(PlaybackId(1), vec![0.5].into(), Duration::ZERO);
        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_clear_silences_everything() {
        let (mixer, mut rx) = mixer(1);
        mixer.add(PlaybackId(1), vec![0.5; 10].into(), Duration::ZERO);
        mixer.add(PlaybackId(2), vec![0.5; 10].into(), Duration::ZERO);
        assert_eq!(mixer.clear(), 2);

        let mut out = vec![1.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0; 4]);
        // Stopped voices are not reported as finished
        assert!(finished(&mut rx).is_empty());
    }

    #[test]
    fn test_contended_block_holds_clock() {
        let (mixer, _rx) = mixer(1);
        mixer.add(PlaybackId(1), vec![0.5; 3].into(), Duration::ZERO);

        let mut out = vec![1.0; 4];
        {
            let _held = mixer.voices.lock();
            mixer.render(&mut out);
        }
        assert_eq!(out, vec![0.0; 4]);
        assert_eq!(mixer.now(), Duration::ZERO);
        assert_eq!(mixer.contended_blocks(), 1);

        // Nothing was skipped: the voice plays from its first frame
        mixer.render(&mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.0]);
        assert_eq!(mixer.now(), Duration::from_millis(4));
    }

    #[test]
    fn test_remove_single_voice() {
        let (mixer, _rx) = mixer(1);
        mixer.add(PlaybackId(1), vec![0.5; 10].into(), Duration::ZERO);
        assert!(mixer.remove(PlaybackId(1)));
        assert!(!mixer.remove(PlaybackId(1)));
    }
}
