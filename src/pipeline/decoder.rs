//! Decode worker - turns inbound base64 payloads into playable buffers.
//!
//! Jobs are decoded strictly in submission order on one task, so results
//! reach the session in receipt order. Each job carries the interruption
//! generation it was requested under; the session drops results whose
//! generation is no longer current.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chunk::DecodedAudio;
use crate::format::decode_payload;
use crate::session::{InboxSender, SessionInput};
use crate::DecodeError;

/// Identifies a decode request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTicket {
    /// Interruption generation at request time.
    pub generation: u64,
    /// Receipt order of the payload within the session.
    pub sequence: u64,
}

/// One inbound audio payload to decode.
#[derive(Debug, Clone)]
pub(crate) struct DecodeJob {
    pub ticket: DecodeTicket,
    pub data: String,
    pub mime_type: String,
}

/// Result of a decode, delivered to the session inbox.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// The ticket the job was submitted with.
    pub ticket: DecodeTicket,
    /// Decoded audio, or why the payload was dropped.
    pub result: Result<DecodedAudio, DecodeError>,
}

/// Handle to the decode worker task.
pub(crate) struct DecoderHandle {
    jobs: mpsc::UnboundedSender<DecodeJob>,
    task: JoinHandle<()>,
}

impl DecoderHandle {
    /// Queues a payload. Returns `false` if the worker is gone.
    pub fn submit(&self, job: DecodeJob) -> bool {
        self.jobs.send(job).is_ok()
    }

    /// Stops the worker; queued jobs are dropped.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Spawns the decode worker.
///
/// `default_rate` is assumed for payloads whose mime tag carries no rate.
pub(crate) fn spawn_decoder(inbox: InboxSender, default_rate: u32) -> DecoderHandle {
    let (jobs, mut rx) = mpsc::unbounded_channel::<DecodeJob>();
    let task = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = decode_payload(&job.data, &job.mime_type, default_rate);
            let outcome = DecodeOutcome {
                ticket: job.ticket,
                result,
            };
            if inbox.send(SessionInput::Decoded(outcome)).is_err() {
                break;
            }
        }
    });
    DecoderHandle { jobs, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::inbox;

    fn job(sequence: u64, data: &str) -> DecodeJob {
        DecodeJob {
            ticket: DecodeTicket {
                generation: 0,
                sequence,
            },
            data: data.to_string(),
            mime_type: "audio/pcm;rate=24000".to_string(),
        }
    }

    async fn next_outcome(rx: &mut crate::session::InboxReceiver) -> DecodeOutcome {
        match rx.recv().await {
            Some(SessionInput::Decoded(outcome)) => outcome,
            other => panic!("expected a decode outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decodes_in_submission_order() {
        let (tx, mut rx) = inbox();
        let decoder = spawn_decoder(tx, 24000);

        assert!(decoder.submit(job(0, "AEA=")));
        assert!(decoder.submit(job(1, "AEAAQA==")));

        let first = next_outcome(&mut rx).await;
        let second = next_outcome(&mut rx).await;
        assert_eq!(first.ticket.sequence, 0);
        assert_eq!(first.result.unwrap().frame_count(), 1);
        assert_eq!(second.ticket.sequence, 1);
        assert_eq!(second.result.unwrap().frame_count(), 2);

        decoder.stop();
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_fatal() {
        let (tx, mut rx) = inbox();
        let decoder = spawn_decoder(tx, 24000);

        decoder.submit(job(0, "%%%"));
        decoder.submit(job(1, "AEA="));

        assert!(matches!(
            next_outcome(&mut rx).await.result,
            Err(DecodeError::InvalidBase64(_))
        ));
        assert!(next_outcome(&mut rx).await.result.is_ok());

        decoder.stop();
    }
}
