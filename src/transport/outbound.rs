//! Outbound queue for audio captured before the channel is ready.

use std::collections::VecDeque;

use crate::chunk::EncodedAudioChunk;

/// FIFO of chunks waiting for the handshake acknowledgement.
///
/// Nothing is ever dropped or coalesced: chunks leave in exactly the order
/// they were pushed.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<EncodedAudioChunk>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk.
    pub fn push(&mut self, chunk: EncodedAudioChunk) {
        self.pending.push_back(chunk);
    }

    /// Removes and returns every queued chunk, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = EncodedAudioChunk> + '_ {
        self.pending.drain(..)
    }

    /// Discards everything queued, returning how many chunks were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
