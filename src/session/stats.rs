//! Session counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about a voice session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames captured from the microphone and encoded.
    pub chunks_captured: u64,
    /// Chunks handed to the channel.
    pub chunks_sent: u64,
    /// Chunks that had to wait for the channel to become ready.
    pub chunks_queued: u64,
    /// Decoded buffers scheduled for playback.
    pub buffers_scheduled: u64,
    /// Inbound payloads dropped because they couldn't be decoded.
    pub decode_failures: u64,
    /// Buffers discarded because an interruption overtook their decode.
    pub stale_buffers: u64,
    /// Interruptions received from the endpoint.
    pub interruptions: u64,
    /// Release passes that actually freed something. At most one per session.
    pub release_passes: u64,
}

/// Internal counters shared between the controller and the capture task.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub chunks_captured: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub chunks_queued: AtomicU64,
    pub buffers_scheduled: AtomicU64,
    pub decode_failures: AtomicU64,
    pub stale_buffers: AtomicU64,
    pub interruptions: AtomicU64,
    pub release_passes: AtomicU64,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            chunks_captured: self.chunks_captured.load(Ordering::SeqCst),
            chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            chunks_queued: self.chunks_queued.load(Ordering::SeqCst),
            buffers_scheduled: self.buffers_scheduled.load(Ordering::SeqCst),
            decode_failures: self.decode_failures.load(Ordering::SeqCst),
            stale_buffers: self.stale_buffers.load(Ordering::SeqCst),
            interruptions: self.interruptions.load(Ordering::SeqCst),
            release_passes: self.release_passes.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.chunks_sent, 0);
        assert_eq!(stats.release_passes, 0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = SessionCounters::default();
        SessionCounters::bump(&counters.chunks_captured);
        SessionCounters::bump(&counters.chunks_captured);
        SessionCounters::bump(&counters.interruptions);

        let stats = counters.snapshot();
        assert_eq!(stats.chunks_captured, 2);
        assert_eq!(stats.interruptions, 1);
        assert_eq!(stats.chunks_sent, 0);
    }
}
