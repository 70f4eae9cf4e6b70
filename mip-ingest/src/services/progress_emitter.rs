//! Progress emitter: the single writer of a job's event stream
//!
//! Events travel over a bounded channel to whatever renders them (the SSE
//! response in production, a plain receiver in tests). The terminal methods
//! take `self`, so nothing can be emitted after the outcome. If the emitter
//! is dropped without a terminal outcome (early return, panic unwinding)
//! it emits a generic error record on the way out.

use crate::error::IngestError;
use crate::models::PersistedFileRecord;
use mip_common::events::{ProgressEvent, ProgressPhase};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Channel capacity between a job and its consumer
pub const EVENT_BUFFER: usize = 32;

/// Message used when a job ends without an explicit outcome
pub const ABANDONED_JOB_MESSAGE: &str = "The upload stopped unexpectedly. Please try again.";

/// Ordered event writer for one job
pub struct ProgressEmitter {
    job_id: Uuid,
    tx: mpsc::Sender<ProgressEvent>,
    consumer_gone: bool,
    finished: bool,
}

impl ProgressEmitter {
    /// Emitter plus the receiving end the consumer reads from
    pub fn channel(job_id: Uuid) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (
            Self {
                job_id,
                tx,
                consumer_gone: false,
                finished: false,
            },
            rx,
        )
    }

    /// True once a send found the receiver closed
    pub fn consumer_gone(&self) -> bool {
        self.consumer_gone
    }

    /// Phase transition notice
    pub async fn status(&mut self, phase: ProgressPhase, message: impl Into<String>) {
        self.send(ProgressEvent::status(phase, message)).await;
    }

    /// Progress within a phase
    pub async fn progress(&mut self, phase: ProgressPhase, message: impl Into<String>, percent: u8) {
        self.send(ProgressEvent::progress(phase, message, percent))
            .await;
    }

    /// Success outcome: `{success, file}` then `{done}`
    pub async fn succeed(mut self, record: &PersistedFileRecord) {
        self.finished = true;
        let mut fields = Map::new();
        fields.insert("file".to_string(), file_payload(record));
        self.send(ProgressEvent::success(fields)).await;
        self.send(ProgressEvent::done()).await;
    }

    /// Failure outcome: a single `{error}` record
    pub async fn fail(mut self, err: &IngestError) {
        self.finished = true;
        self.send(ProgressEvent::error(err.user_message())).await;
    }

    async fn send(&mut self, event: ProgressEvent) {
        if self.consumer_gone {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!(job_id = %self.job_id, "Event consumer went away");
            self.consumer_gone = true;
        }
    }
}

impl Drop for ProgressEmitter {
    fn drop(&mut self) {
        if self.finished || self.consumer_gone {
            return;
        }

        let event = ProgressEvent::error(ABANDONED_JOB_MESSAGE);
        match self.tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Buffer full: hand the final send to the runtime if there is one
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    handle.spawn(async move {
                        let _ = tx.send(event).await;
                    });
                }
            }
        }
    }
}

/// JSON body of the success record's `file` field
pub fn file_payload(record: &PersistedFileRecord) -> Value {
    json!({
        "id": record.id,
        "name": record.display_name,
        "mimeType": record.mime_type,
        "sizeBytes": record.size_bytes,
        "source": record.source_mode,
        "providerFileId": record.provider_file_id,
        "uri": record.provider_uri,
        "sha256": record.sha256,
        "readyAt": record.ready_at,
    })
}
