//! Progress events carried on an ingestion event stream
//!
//! One job produces an ordered sequence of [`ProgressEvent`]s. Progress and
//! status events may appear any number of times; every well-formed stream ends
//! with exactly one terminal outcome:
//! - failure: a single `{"error": "..."}` record
//! - success: `{"success": true, ...}` followed by `{"done": true}`
//!
//! Percentages are derived from the structured [`ProgressPhase`], never from
//! message wording. [`estimate_percent_from_text`] remains for clients that
//! only have the human-readable text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse pipeline phase attached to progress/status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Input mode, size and source checks
    Validating,
    /// Fetching a remote URL server-side
    Downloading,
    /// Opening a resumable upload session with the provider
    Initializing,
    /// Sending the payload with the upload-and-finalize command
    Transferring,
    /// Waiting for the provider to finish readiness processing
    Processing,
    /// Writing the durable file record
    Persisting,
    /// Job finished successfully
    Complete,
}

impl ProgressPhase {
    /// Completion percentage at the start of this phase
    pub fn percent(self) -> u8 {
        match self {
            ProgressPhase::Validating => 5,
            ProgressPhase::Downloading => 15,
            ProgressPhase::Initializing => 30,
            ProgressPhase::Transferring => 45,
            ProgressPhase::Processing => 60,
            ProgressPhase::Persisting => 95,
            ProgressPhase::Complete => 100,
        }
    }
}

/// Percentage while polling, spread across the processing band (60..=90)
pub fn processing_percent(attempt: u32, max_attempts: u32) -> u8 {
    let base = ProgressPhase::Processing.percent() as u32;
    if max_attempts == 0 {
        return base as u8;
    }
    let span = 30 * attempt.min(max_attempts) / max_attempts;
    (base + span) as u8
}

/// Percentage while downloading, spread across the download band (15..30)
pub fn download_percent(received: u64, total: Option<u64>) -> u8 {
    let base = ProgressPhase::Downloading.percent() as u64;
    match total {
        Some(total) if total > 0 => (base + 14 * received.min(total) / total) as u8,
        _ => base as u8,
    }
}

/// Advisory percentage derived from free-text status messages
///
/// Tolerates anything: unrecognized text yields `None` rather than an error.
pub fn estimate_percent_from_text(message: &str) -> Option<u8> {
    let lower = message.to_ascii_lowercase();
    let phase = if lower.contains("complete") || lower.contains("ready") {
        ProgressPhase::Complete
    } else if lower.contains("saving") {
        ProgressPhase::Persisting
    } else if lower.contains("processing") {
        ProgressPhase::Processing
    } else if lower.contains("uploading") {
        ProgressPhase::Transferring
    } else if lower.contains("starting upload") || lower.contains("initializ") {
        ProgressPhase::Initializing
    } else if lower.contains("downloading") {
        ProgressPhase::Downloading
    } else if lower.contains("validat") {
        ProgressPhase::Validating
    } else {
        return None;
    };
    Some(phase.percent())
}

/// One record on the event stream
///
/// Serialized untagged so the wire shape is exactly the payload object, e.g.
/// `{"status":"Processing video...","phase":"processing","percent":62}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// Terminal failure with a humanized cause
    Error { error: String },

    /// Successful result; `fields` carries the final payload (e.g. `file`)
    Success {
        success: bool,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },

    /// Closes a successful stream
    Done { done: bool },

    /// Fine-grained progress (bytes moved, attempts made)
    Progress {
        progress: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<ProgressPhase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },

    /// Phase transition notice
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<ProgressPhase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },
}

impl ProgressEvent {
    /// Phase transition with the phase's starting percentage
    pub fn status(phase: ProgressPhase, message: impl Into<String>) -> Self {
        ProgressEvent::Status {
            status: message.into(),
            phase: Some(phase),
            percent: Some(phase.percent()),
        }
    }

    /// Progress within a phase at an explicit percentage
    pub fn progress(phase: ProgressPhase, message: impl Into<String>, percent: u8) -> Self {
        ProgressEvent::Progress {
            progress: message.into(),
            phase: Some(phase),
            percent: Some(percent.min(100)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            error: message.into(),
        }
    }

    pub fn success(fields: Map<String, Value>) -> Self {
        ProgressEvent::Success {
            success: true,
            fields,
        }
    }

    pub fn done() -> Self {
        ProgressEvent::Done { done: true }
    }

    /// True for the records after which nothing else is emitted
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Error { .. } | ProgressEvent::Done { .. })
    }

    /// Percentage for progress-bar rendering, if one can be derived
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Progress { percent, progress, .. } => {
                percent.or_else(|| estimate_percent_from_text(progress))
            }
            ProgressEvent::Status { percent, status, .. } => {
                percent.or_else(|| estimate_percent_from_text(status))
            }
            ProgressEvent::Success { .. } | ProgressEvent::Done { .. } => Some(100),
            ProgressEvent::Error { .. } => None,
        }
    }
}
