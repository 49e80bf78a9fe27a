//! Ownership and release of everything a live session holds.

use tokio::task::JoinHandle;

use crate::audio::{InputDevice, PlaybackEngine};
use crate::pipeline::{CaptureHandle, DecoderHandle, PlaybackScheduler};
use crate::transport::SessionHandle;

/// What one [`SessionResources::release_all`] pass released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// The capture bridge was stopped.
    pub capture_stopped: bool,
    /// The microphone stream was stopped.
    pub input_stream_stopped: bool,
    /// The microphone was closed.
    pub input_closed: bool,
    /// The decode worker was stopped.
    pub decoder_stopped: bool,
    /// Number of playback buffers that were still scheduled.
    pub playback_stopped: usize,
    /// The speaker was closed.
    pub output_closed: bool,
    /// The channel was closed.
    pub channel_closed: bool,
}

impl ReleaseReport {
    /// Returns `true` if the pass found nothing to release.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Hardware, task and network handles owned by one session.
///
/// Every slot is optional: a session that failed half way through connecting
/// holds only what it acquired, and release skips the rest.
#[derive(Default)]
pub(crate) struct SessionResources {
    pub capture: Option<CaptureHandle>,
    pub input: Option<Box<dyn InputDevice>>,
    pub decoder: Option<DecoderHandle>,
    pub scheduler: PlaybackScheduler,
    pub output: Option<Box<dyn PlaybackEngine>>,
    pub channel: Option<SessionHandle>,
    /// Fires if the endpoint never acknowledges the setup handshake.
    pub ready_timer: Option<JoinHandle<()>>,
}

impl SessionResources {
    /// Releases everything, in dependency order. Idempotent: a second pass
    /// finds nothing and returns an empty report.
    ///
    /// Capture stops before the microphone closes so the bridge never reads
    /// from a dead ring; playback stops before the speaker closes; the channel
    /// closes last and tolerates an already-closed transport.
    pub fn release_all(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if let Some(timer) = self.ready_timer.take() {
            timer.abort();
        }

        if let Some(capture) = self.capture.take() {
            capture.stop();
            report.capture_stopped = true;
        }

        if let Some(mut input) = self.input.take() {
            report.input_stream_stopped = input.stop();
            if !input.is_closed() {
                report.input_closed = input.close();
            }
        }

        if let Some(decoder) = self.decoder.take() {
            decoder.stop();
            report.decoder_stopped = true;
        }

        if let Some(mut output) = self.output.take() {
            report.playback_stopped = self.scheduler.halt(output.as_mut());
            if !output.is_closed() {
                report.output_closed = output.close();
            }
        }
        self.scheduler.clear();

        if let Some(mut channel) = self.channel.take() {
            report.channel_closed = channel.close();
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, MockAudioBackend};
    use crate::chunk::DecodedAudio;
    use crate::session::{inbox, PlaybackNotifier};
    use crate::transport::TransportLink;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    #[test]
    fn test_empty_resources_release_nothing() {
        let mut resources = SessionResources::default();
        assert!(resources.release_all().is_empty());
    }

    #[test]
    fn test_release_all_frees_everything_once() {
        let backend = MockAudioBackend::new();
        let (tx, _rx) = inbox();
        let mut resources = SessionResources::default();

        let mut input = backend.open_input(None, Duration::from_secs(1)).unwrap();
        let _consumer = input.start().unwrap();
        resources.input = Some(input);

        let mut output = backend
            .open_output(None, PlaybackNotifier::new(tx))
            .unwrap();
        resources
            .scheduler
            .schedule(output.as_mut(), DecodedAudio::silence(2400, 24000))
            .unwrap();
        resources.output = Some(output);

        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        resources.channel = Some(SessionHandle::new(
            TransportLink::new(out_tx).with_shutdown(shutdown_tx),
        ));

        let report = resources.release_all();
        assert!(report.input_stream_stopped);
        assert!(report.input_closed);
        assert_eq!(report.playback_stopped, 1);
        assert!(report.output_closed);
        assert!(report.channel_closed);
        assert!(!report.capture_stopped);
        assert!(shutdown_rx.try_recv().is_ok());

        assert!(resources.release_all().is_empty());
        assert_eq!(backend.input_closes(), 1);
        assert_eq!(backend.output_closes(), 1);
        assert!(!backend.leases().input_held());
        assert!(!backend.leases().output_held());
    }

    #[test]
    fn test_already_closed_devices_are_skipped() {
        let backend = MockAudioBackend::new();
        let mut resources = SessionResources::default();
        let mut input = backend.open_input(None, Duration::from_secs(1)).unwrap();
        input.close();
        resources.input = Some(input);

        let report = resources.release_all();
        assert!(!report.input_closed);
        assert!(!report.input_stream_stopped);
        assert_eq!(backend.input_closes(), 1);
    }
}
