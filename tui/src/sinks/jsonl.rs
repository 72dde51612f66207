//! Machine-Readable Sink
//!
//! One JSON object per accepted event, one line per object, flushed as it
//! is written. Downstream tooling parses this output, so the field set and
//! its order are fixed:
//!
//! ```text
//! {"type":…,"message":…,"timestamp":…,"agent_name":…,"content":…,"tool_name":…}
//! ```
//!
//! Absent optional fields are written as `null`, never omitted.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use flowwatch_core::{AgentDirectory, CompletionResult, Event, EventSink, EventView, Outcome};
use serde::Serialize;

/// Record type written when the watch was cancelled before a terminal event
pub const CANCELLED_RECORD: &str = "cancelled";

/// Record type written when the stream gave up before a terminal event
pub const STREAM_FAILED_RECORD: &str = "stream_failed";

/// One output line
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    /// Event type as sent by the server
    #[serde(rename = "type")]
    pub record_type: String,
    /// Sanitized status message
    pub message: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Resolved agent, if the event has one
    pub agent_name: Option<String>,
    /// Sanitized body (model output, tool result, error)
    pub content: Option<String>,
    /// Tool name, for tool events
    pub tool_name: Option<String>,
}

impl EventRecord {
    /// Normalize an event
    #[must_use]
    pub fn from_event(event: &Event, directory: &AgentDirectory) -> Self {
        let view = EventView::build(event, directory);
        Self {
            record_type: event.event_type.as_str().to_string(),
            message: flowwatch_core::sanitize_status(&event.message),
            timestamp: timestamp(event.timestamp),
            agent_name: view.agent_name().map(str::to_string),
            content: view.content,
            tool_name: view.tool_name,
        }
    }

    /// Closing record for a session that ended without a terminal event
    #[must_use]
    pub fn closing(result: &CompletionResult) -> Option<Self> {
        if result.terminal_event.is_some() {
            return None;
        }
        let record_type = match result.outcome {
            Outcome::Cancelled => CANCELLED_RECORD,
            Outcome::Failure => STREAM_FAILED_RECORD,
            Outcome::Success => return None,
        };
        Some(Self {
            record_type: record_type.to_string(),
            message: result.message.clone().unwrap_or_default(),
            timestamp: timestamp(Utc::now()),
            agent_name: None,
            content: None,
            tool_name: None,
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON-lines sink
pub struct JsonLinesSink<W> {
    out: W,
    directory: Arc<AgentDirectory>,
    records: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink writing to `out`
    pub fn new(out: W, directory: Arc<AgentDirectory>) -> Self {
        Self {
            out,
            directory,
            records: 0,
        }
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Recover the output
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &EventRecord) {
        let written = serde_json::to_writer(&mut self.out, record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        match written {
            Ok(()) => self.records += 1,
            Err(err) => tracing::warn!(error = %err, "failed to write record"),
        }
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn on_event(&mut self, event: &Event) {
        let record = EventRecord::from_event(event, &self.directory);
        self.write_record(&record);
    }

    fn on_finish(&mut self, result: &CompletionResult) {
        if let Some(record) = EventRecord::closing(result) {
            self.write_record(&record);
        }
    }
}
