//! Execution Events
//!
//! The decoded form of one server-pushed event. The event type is an open
//! set: recognised types drive dispatch and rendering, anything else passes
//! through for generic display.
//!
//! The `data` mapping is untyped on the wire. [`EventData`] exposes it through
//! typed accessors that return `None` for absent keys and wrong types alike,
//! so no caller ever has to assert on a JSON shape.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::session::Outcome;

// ============================================================================
// Event Type
// ============================================================================

/// Type of an execution event
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// The execution began running
    ExecutionStarted,
    /// The execution finished successfully (terminal)
    ExecutionCompleted,
    /// The execution failed (terminal)
    ExecutionFailed,
    /// The execution was cancelled server-side (terminal)
    ExecutionCancelled,
    /// A step began
    StepStarted,
    /// A step finished
    StepCompleted,
    /// A step failed
    StepFailed,
    /// Model output for a step
    LlmResponse,
    /// An agent started a tool call
    ToolCallStarted,
    /// A tool call returned
    ToolCallCompleted,
    /// Keep-alive, never shown
    Heartbeat,
    /// Any other type, passed through unchanged
    Other(String),
}

impl EventType {
    /// Parse a wire type string
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "execution_started" => Self::ExecutionStarted,
            "execution_completed" => Self::ExecutionCompleted,
            "execution_failed" => Self::ExecutionFailed,
            "execution_cancelled" => Self::ExecutionCancelled,
            "step_started" => Self::StepStarted,
            "step_completed" => Self::StepCompleted,
            "step_failed" => Self::StepFailed,
            "llm_response" => Self::LlmResponse,
            "tool_call_started" => Self::ToolCallStarted,
            "tool_call_completed" => Self::ToolCallCompleted,
            "heartbeat" => Self::Heartbeat,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire name of this type
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ExecutionStarted => "execution_started",
            Self::ExecutionCompleted => "execution_completed",
            Self::ExecutionFailed => "execution_failed",
            Self::ExecutionCancelled => "execution_cancelled",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::LlmResponse => "llm_response",
            Self::ToolCallStarted => "tool_call_started",
            Self::ToolCallCompleted => "tool_call_completed",
            Self::Heartbeat => "heartbeat",
            Self::Other(name) => name,
        }
    }

    /// The lifecycle outcome this type ends the execution with, if terminal
    #[must_use]
    pub fn terminal_outcome(&self) -> Option<Outcome> {
        match self {
            Self::ExecutionCompleted => Some(Outcome::Success),
            Self::ExecutionFailed => Some(Outcome::Failure),
            Self::ExecutionCancelled => Some(Outcome::Cancelled),
            _ => None,
        }
    }

    /// Whether this type ends the execution
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal_outcome().is_some()
    }

    /// Whether this type is produced by an agent (and so has an agent to resolve)
    #[must_use]
    pub fn is_agent_activity(&self) -> bool {
        matches!(
            self,
            Self::StepStarted
                | Self::StepCompleted
                | Self::StepFailed
                | Self::LlmResponse
                | Self::ToolCallStarted
                | Self::ToolCallCompleted
        )
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event Data
// ============================================================================

/// The free-form `data` mapping of an event with typed accessors
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(Map<String, Value>);

impl EventData {
    /// Wrap a JSON object
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Whether there are no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-blank string value for a key
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// First non-blank string among several keys, in order
    #[must_use]
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.str(key))
    }

    /// Integer value for a key
    #[must_use]
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Floating point value for a key
    #[must_use]
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Boolean value for a key
    #[must_use]
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Value rendered as display text
    ///
    /// Strings are returned as-is, scalars via their JSON form and
    /// objects/arrays as compact JSON. Null and blank strings yield `None`.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// First present value among several keys, rendered as text
    #[must_use]
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.text(key))
    }
}

impl From<Map<String, Value>> for EventData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// Event
// ============================================================================

/// One server-pushed execution event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event id, from the `id:` wire field or the payload
    pub id: Option<String>,
    /// Execution this event belongs to
    pub execution_id: String,
    /// Event type (sole driver of dispatch and rendering)
    pub event_type: EventType,
    /// Step the event belongs to, if any
    pub step_id: Option<String>,
    /// Human-readable text
    pub message: String,
    /// Untyped payload data
    pub data: EventData,
    /// When the server emitted the event
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event with empty data, stamped now
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            id: None,
            execution_id: String::new(),
            event_type,
            step_id: None,
            message: message.into(),
            data: EventData::default(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style data replacement
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = EventData::new(data);
        self
    }

    /// Whether this event is a keep-alive
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.event_type == EventType::Heartbeat
    }

    /// Whether this event ends the execution
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Naive (offset-less) layouts tolerated on the wire, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Parse a wire timestamp
///
/// Accepts, in order: RFC 3339 with offset (with or without fractional
/// seconds), then fractional seconds without offset, then whole seconds
/// without offset.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidTimestamp`] when no format matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let trimmed = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(DecodeError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_event_type_roundtrip_names() {
        for name in [
            "execution_started",
            "execution_completed",
            "execution_failed",
            "execution_cancelled",
            "step_started",
            "step_completed",
            "step_failed",
            "llm_response",
            "tool_call_started",
            "tool_call_completed",
            "heartbeat",
        ] {
            let parsed = EventType::parse(name);
            assert!(!matches!(parsed, EventType::Other(_)), "{name} should be known");
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_event_type_passes_through() {
        let parsed = EventType::parse("flow_paused");
        assert_eq!(parsed, EventType::Other("flow_paused".to_string()));
        assert_eq!(parsed.to_string(), "flow_paused");
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_terminal_outcomes() {
        assert_eq!(
            EventType::ExecutionCompleted.terminal_outcome(),
            Some(Outcome::Success)
        );
        assert_eq!(
            EventType::ExecutionFailed.terminal_outcome(),
            Some(Outcome::Failure)
        );
        assert_eq!(
            EventType::ExecutionCancelled.terminal_outcome(),
            Some(Outcome::Cancelled)
        );
        assert_eq!(EventType::StepFailed.terminal_outcome(), None);
    }

    #[test]
    fn test_event_data_accessors_never_panic_on_wrong_types() {
        let data = EventData::new(
            json!({
                "agent_name": "JAX",
                "blank": "   ",
                "count": 3,
                "ratio": 0.5,
                "done": true,
                "nested": {"a": 1},
                "nothing": null
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );

        assert_eq!(data.str("agent_name"), Some("JAX"));
        assert_eq!(data.str("blank"), None);
        assert_eq!(data.str("count"), None);
        assert_eq!(data.u64("count"), Some(3));
        assert_eq!(data.u64("agent_name"), None);
        assert_eq!(data.f64("ratio"), Some(0.5));
        assert_eq!(data.bool("done"), Some(true));
        assert_eq!(data.bool("missing"), None);
        assert_eq!(data.text("nested").as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(data.text("nothing"), None);
        assert_eq!(data.text("count").as_deref(), Some("3"));
        assert_eq!(data.first_str(&["missing", "blank", "agent_name"]), Some("JAX"));
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp("2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(ts.hour(), 1);
        assert_eq!(ts.minute(), 4);
    }

    #[test]
    fn test_parse_timestamp_with_offset_and_fraction() {
        let ts = parse_timestamp("2024-01-02T03:04:05.250Z").unwrap();
        assert_eq!(ts.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_parse_timestamp_fraction_without_offset() {
        let ts = parse_timestamp("2024-01-02T03:04:05.123456").unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.second(), 5);
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_timestamp_without_fraction_or_offset() {
        let ts = parse_timestamp("2024-01-02T03:04:05").unwrap();
        assert_eq!(ts.day(), 2);
        assert_eq!(ts.hour(), 3);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DecodeError::InvalidTimestamp(_))
        ));
    }
}
