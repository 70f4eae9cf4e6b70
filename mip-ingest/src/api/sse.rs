//! Server-Sent Events rendering of a job's progress channel
//!
//! The stream owns the job's cancellation guard: when the client disconnects
//! axum drops the stream, the guard fires and the job stops at its next
//! network call or poll sleep.

use axum::{
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use mip_common::events::ProgressEvent;
use mip_common::sse::to_sse_event;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::{debug, warn};
use uuid::Uuid;

/// Heartbeat comment interval
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Stream `rx` to the client until its terminal record
pub fn job_event_stream(
    job_id: Uuid,
    mut rx: mpsc::Receiver<ProgressEvent>,
    cancel_guard: DropGuard,
) -> Response {
    let stream = async_stream::stream! {
        let _cancel_guard = cancel_guard;

        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            match to_sse_event(&event) {
                Ok(sse_event) => yield Ok::<Event, Infallible>(sse_event),
                Err(e) => warn!(job_id = %job_id, "SSE: Failed to serialize event: {}", e),
            }
            if terminal {
                break;
            }
        }

        debug!(job_id = %job_id, "SSE: Job event stream closed");
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    );

    ([(header::CONNECTION, "keep-alive")], sse).into_response()
}
