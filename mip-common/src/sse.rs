//! Event-stream wire format
//!
//! Each record is one JSON payload on a `data:` line terminated by a blank
//! line (`data: <json>\n\n`). The server side uses axum's SSE response type;
//! this module holds the pieces both ends share: record encoding, the
//! conversion into an axum [`Event`], and an incremental decoder for
//! consumers reading the body chunk by chunk.

use crate::events::ProgressEvent;
use crate::{Error, Result};
use axum::response::sse::Event;

/// Encode one record in wire format
pub fn encode_record(event: &ProgressEvent) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Convert a progress event into an axum SSE event
pub fn to_sse_event(event: &ProgressEvent) -> Result<Event> {
    Ok(Event::default().data(serde_json::to_string(event)?))
}

/// Incremental event-stream decoder
///
/// Bytes may arrive split at arbitrary offsets, including inside a UTF-8
/// sequence or between the two newlines of a delimiter. Complete records are
/// returned as soon as their terminating blank line has been seen; partial
/// input stays buffered. Comment lines (`: heartbeat`) and non-`data` fields
/// are skipped.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every record it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ProgressEvent>> {
        // CR never appears unescaped inside a JSON payload, so dropping it
        // turns CRLF framing into LF framing.
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_record_end(&self.buffer) {
            let record: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_record(&record[..end])? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Bytes received but not yet forming a complete record
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Signal end of stream
    ///
    /// A trailing record without its blank-line terminator is still decoded;
    /// whitespace-only leftovers are ignored.
    pub fn finish(self) -> Result<Option<ProgressEvent>> {
        if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        parse_record(&self.buffer)
    }
}

fn find_record_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_record(record: &[u8]) -> Result<Option<ProgressEvent>> {
    let text = std::str::from_utf8(record)
        .map_err(|e| Error::Decode(format!("record is not valid UTF-8: {}", e)))?;

    let mut data_lines = Vec::new();
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return Ok(None);
    }

    let payload = data_lines.join("\n");
    serde_json::from_str(&payload)
        .map(Some)
        .map_err(|e| Error::Decode(format!("invalid payload {:?}: {}", payload, e)))
}
