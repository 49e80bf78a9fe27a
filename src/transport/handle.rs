//! The session's exclusive handle on an open channel.

use super::{ClientMessage, OutboundQueue, TransportLink};
use crate::chunk::EncodedAudioChunk;
use crate::VoiceSessionError;

/// What happened to a submitted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Submitted {
    /// Handed to the transport.
    Sent,
    /// Held until the channel is ready.
    Queued,
}

/// Open channel plus the queue that bridges the gap until the handshake is
/// acknowledged.
///
/// Created on a successful connect and invalidated by
/// [`close()`](SessionHandle::close) on any terminal transition.
pub(crate) struct SessionHandle {
    link: TransportLink,
    queue: OutboundQueue,
    ready: bool,
    closed: bool,
}

impl SessionHandle {
    pub fn new(link: TransportLink) -> Self {
        Self {
            link,
            queue: OutboundQueue::new(),
            ready: false,
            closed: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Sends `chunk`, or queues it if the channel isn't ready yet.
    pub fn submit(&mut self, chunk: EncodedAudioChunk) -> Result<Submitted, VoiceSessionError> {
        if self.closed {
            return Err(VoiceSessionError::mid_session("channel is closed"));
        }
        if !self.ready {
            self.queue.push(chunk);
            return Ok(Submitted::Queued);
        }
        self.send(chunk)?;
        Ok(Submitted::Sent)
    }

    /// Marks the channel ready and flushes the queue in order.
    ///
    /// Returns how many queued chunks were sent.
    pub fn mark_ready(&mut self) -> Result<usize, VoiceSessionError> {
        if self.closed {
            return Ok(0);
        }
        self.ready = true;
        let pending: Vec<EncodedAudioChunk> = self.queue.drain().collect();
        let flushed = pending.len();
        for chunk in pending {
            self.send(chunk)?;
        }
        Ok(flushed)
    }

    fn send(&self, chunk: EncodedAudioChunk) -> Result<(), VoiceSessionError> {
        self.link
            .outbound
            .send(ClientMessage::audio(chunk))
            .map_err(|_| VoiceSessionError::mid_session("transport stopped accepting messages"))
    }

    /// Closes the channel without waiting for the remote side.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.ready = false;

        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded queued audio on close");
        }
        if let Some(shutdown) = self.link.shutdown.take() {
            // The transport may already be gone
            let _ = shutdown.send(());
        }
        for task in self.link.tasks.drain(..) {
            task.abort();
        }
        true
    }
}
