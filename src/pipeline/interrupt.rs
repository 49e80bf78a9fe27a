//! Barge-in handling.

use super::PlaybackScheduler;
use crate::audio::PlaybackEngine;

/// Halts playback when the endpoint signals the user spoke over it.
///
/// Every interruption bumps a generation counter. Decodes are tagged with
/// the generation they were requested under, and a result from an older
/// generation is stale: it must be discarded rather than scheduled, even if
/// it completes after the interruption was handled.
#[derive(Debug, Default)]
pub struct InterruptionHandler {
    generation: u64,
}

impl InterruptionHandler {
    /// Creates a handler at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation new decode requests are tagged with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if a decode requested under `generation` must be dropped.
    pub fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation
    }

    /// Stops all playback and invalidates in-flight decodes.
    ///
    /// Returns how many buffers were stopped.
    pub fn interrupt(
        &mut self,
        scheduler: &mut PlaybackScheduler,
        engine: &mut dyn PlaybackEngine,
    ) -> usize {
        self.generation += 1;
        scheduler.halt(engine)
    }
}
