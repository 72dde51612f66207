//! Event View
//!
//! Presentation-neutral digest of one event: who did it, what to show as a
//! headline, which body text to show under it, and in which tone. All sinks
//! render from this so resolver and sanitizer rules live in one place.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::directory::AgentDirectory;
use crate::events::{Event, EventType};
use crate::resolver::{has_agent_reference, resolve, AgentIdentity};
use crate::sanitize::{sanitize, sanitize_status};

/// Data keys holding a tool name
pub const TOOL_NAME_KEYS: &[&str] = &["tool_name", "tool", "name"];

/// Data keys holding tool arguments
pub const TOOL_ARGS_KEYS: &[&str] = &["arguments", "tool_args", "tool_input", "input"];

/// Data keys holding a tool result
pub const TOOL_RESULT_KEYS: &[&str] = &["result", "tool_result", "output"];

/// Data keys holding model output
pub const CONTENT_KEYS: &[&str] = &["content", "response", "text", "output"];

/// Data keys holding an error description
pub const ERROR_KEYS: &[&str] = &["error", "error_message", "reason"];

/// Visual weight of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Ordinary progress
    Info,
    /// Something finished well
    Success,
    /// Something failed
    Failure,
    /// Needs attention but is not a failure
    Warning,
    /// Unrecognised or low-value
    Muted,
}

/// Display digest of one event
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventView {
    /// Event type
    pub event_type: EventType,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
    /// Resolved agent, for agent activity or events naming an agent
    pub agent: Option<AgentIdentity>,
    /// One-line summary (tags and extra whitespace removed)
    pub headline: String,
    /// Longer body (model output, tool result, error detail)
    pub content: Option<String>,
    /// Tool involved, for tool events
    pub tool_name: Option<String>,
    /// Tool arguments, for tool calls
    pub tool_args: Option<String>,
    /// Reported duration, if any
    pub duration_ms: Option<u64>,
    /// Visual weight
    pub tone: Tone,
}

impl EventView {
    /// Digest `event`, resolving its agent against `directory`
    #[must_use]
    pub fn build(event: &Event, directory: &AgentDirectory) -> Self {
        let data = &event.data;
        let event_type = &event.event_type;

        let agent = (event_type.is_agent_activity() || has_agent_reference(data))
            .then(|| resolve(directory, data));

        let is_tool = matches!(
            event_type,
            EventType::ToolCallStarted | EventType::ToolCallCompleted
        );
        let tool_name = is_tool
            .then(|| data.first_str(TOOL_NAME_KEYS))
            .flatten()
            .map(sanitize_status)
            .filter(|name| !name.is_empty());
        let tool_args = (*event_type == EventType::ToolCallStarted)
            .then(|| data.first_text(TOOL_ARGS_KEYS))
            .flatten()
            .map(|args| sanitize(&args))
            .filter(|args| !args.is_empty());

        let mut headline = sanitize_status(&event.message);
        let mut content = match event_type {
            EventType::LlmResponse => data.first_text(CONTENT_KEYS),
            EventType::ToolCallCompleted => data.first_text(TOOL_RESULT_KEYS),
            EventType::ExecutionCompleted | EventType::StepCompleted => {
                data.first_text(&["result", "output"])
            }
            EventType::ExecutionFailed | EventType::StepFailed => data.first_text(ERROR_KEYS),
            _ => None,
        }
        .map(|text| sanitize(&text))
        .filter(|text| !text.is_empty());

        // Model output carried only in the message moves to the body
        if *event_type == EventType::LlmResponse && content.is_none() {
            let body = sanitize(&event.message);
            if !body.is_empty() {
                content = Some(body);
                headline.clear();
            }
        }

        if headline.is_empty() {
            headline = default_headline(event_type, tool_name.as_deref());
        }

        Self {
            event_type: event_type.clone(),
            timestamp: event.timestamp,
            agent,
            headline,
            content,
            tool_name,
            tool_args,
            duration_ms: data.u64("duration_ms"),
            tone: tone_of(event_type),
        }
    }

    /// Short human label of the event type
    #[must_use]
    pub fn label(&self) -> String {
        label_of(&self.event_type)
    }

    /// Name of the resolved agent, if any
    #[must_use]
    pub fn agent_name(&self) -> Option<&str> {
        self.agent.as_ref().map(|agent| agent.name.as_str())
    }
}

/// Human label for an event type
#[must_use]
pub fn label_of(event_type: &EventType) -> String {
    match event_type {
        EventType::ExecutionStarted => "started".to_string(),
        EventType::ExecutionCompleted => "completed".to_string(),
        EventType::ExecutionFailed => "failed".to_string(),
        EventType::ExecutionCancelled => "cancelled".to_string(),
        EventType::StepStarted => "step".to_string(),
        EventType::StepCompleted => "step done".to_string(),
        EventType::StepFailed => "step failed".to_string(),
        EventType::LlmResponse => "response".to_string(),
        EventType::ToolCallStarted => "tool".to_string(),
        EventType::ToolCallCompleted => "tool done".to_string(),
        EventType::Heartbeat => "heartbeat".to_string(),
        EventType::Other(name) => name.replace('_', " "),
    }
}

fn tone_of(event_type: &EventType) -> Tone {
    match event_type {
        EventType::ExecutionCompleted | EventType::StepCompleted => Tone::Success,
        EventType::ExecutionFailed | EventType::StepFailed => Tone::Failure,
        EventType::ExecutionCancelled => Tone::Warning,
        EventType::ExecutionStarted
        | EventType::StepStarted
        | EventType::LlmResponse
        | EventType::ToolCallStarted
        | EventType::ToolCallCompleted => Tone::Info,
        EventType::Heartbeat | EventType::Other(_) => Tone::Muted,
    }
}

fn default_headline(event_type: &EventType, tool: Option<&str>) -> String {
    match (event_type, tool) {
        (EventType::ToolCallStarted, Some(tool)) => format!("Calling {tool}"),
        (EventType::ToolCallCompleted, Some(tool)) => format!("{tool} returned"),
        (EventType::ExecutionStarted, _) => "Execution started".to_string(),
        (EventType::ExecutionCompleted, _) => "Execution completed".to_string(),
        (EventType::ExecutionFailed, _) => "Execution failed".to_string(),
        (EventType::ExecutionCancelled, _) => "Execution cancelled".to_string(),
        (EventType::StepStarted, _) => "Step started".to_string(),
        (EventType::StepCompleted, _) => "Step completed".to_string(),
        (EventType::StepFailed, _) => "Step failed".to_string(),
        (EventType::LlmResponse, _) => "Response".to_string(),
        (EventType::ToolCallStarted | EventType::ToolCallCompleted, None) => "Tool call".to_string(),
        (EventType::Heartbeat, _) => String::new(),
        (EventType::Other(name), _) => name.clone(),
    }
}

/// Shorten `text` to at most `max` characters, marking the cut with `…`
///
/// `max == 0` disables truncation.
#[must_use]
pub fn truncate_field(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::AgentDirectoryEntry;
    use serde_json::{json, Value};

    fn event(event_type: EventType, message: &str, data: Value) -> Event {
        Event::new(event_type, message).with_data(data.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_step_started_with_agent_name() {
        let directory = AgentDirectory::new([AgentDirectoryEntry::named("JAX").with_color("magenta")]);
        let view = EventView::build(
            &event(EventType::StepStarted, "doing work", json!({"agent_name": "JAX"})),
            &directory,
        );

        assert_eq!(view.agent_name(), Some("JAX"));
        assert_eq!(view.agent.as_ref().unwrap().color, "magenta");
        assert_eq!(view.headline, "doing work");
        assert_eq!(view.tone, Tone::Info);
        assert_eq!(view.label(), "step");
    }

    #[test]
    fn test_llm_response_content_is_sanitized() {
        let view = EventView::build(
            &event(
                EventType::LlmResponse,
                "model replied",
                json!({"content": "<think>hidden</think>\n\nVisible answer"}),
            ),
            &AgentDirectory::empty(),
        );
        assert_eq!(view.content.as_deref(), Some("Visible answer"));
        assert_eq!(view.headline, "model replied");
        assert!(view.agent.as_ref().unwrap().is_placeholder());
    }

    #[test]
    fn test_llm_response_in_message_moves_to_body() {
        let view = EventView::build(
            &event(EventType::LlmResponse, "line one\n\n\n\nline two", json!({})),
            &AgentDirectory::empty(),
        );
        assert_eq!(view.content.as_deref(), Some("line one\n\nline two"));
        assert_eq!(view.headline, "Response");
    }

    #[test]
    fn test_tool_call_fields() {
        let started = EventView::build(
            &event(
                EventType::ToolCallStarted,
                "",
                json!({"tool_name": "web_search", "arguments": {"q": "rust"}}),
            ),
            &AgentDirectory::empty(),
        );
        assert_eq!(started.tool_name.as_deref(), Some("web_search"));
        assert_eq!(started.tool_args.as_deref(), Some(r#"{"q":"rust"}"#));
        assert_eq!(started.headline, "Calling web_search");

        let finished = EventView::build(
            &event(
                EventType::ToolCallCompleted,
                "",
                json!({"tool": "web_search", "result": "3 hits", "duration_ms": 120}),
            ),
            &AgentDirectory::empty(),
        );
        assert_eq!(finished.content.as_deref(), Some("3 hits"));
        assert_eq!(finished.tool_args, None);
        assert_eq!(finished.duration_ms, Some(120));
    }

    #[test]
    fn test_failure_carries_error() {
        let view = EventView::build(
            &event(EventType::ExecutionFailed, "", json!({"error": "quota exceeded"})),
            &AgentDirectory::empty(),
        );
        assert_eq!(view.tone, Tone::Failure);
        assert_eq!(view.headline, "Execution failed");
        assert_eq!(view.content.as_deref(), Some("quota exceeded"));
        assert!(view.agent.is_none());
    }

    #[test]
    fn test_unknown_type_is_muted_passthrough() {
        let view = EventView::build(
            &event(EventType::parse("flow_paused"), "", json!({})),
            &AgentDirectory::empty(),
        );
        assert_eq!(view.tone, Tone::Muted);
        assert_eq!(view.headline, "flow_paused");
        assert_eq!(view.label(), "flow paused");
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("short", 10), "short");
        assert_eq!(truncate_field("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_field("héllo wörld", 4), "hél…");
        assert_eq!(truncate_field("anything", 0), "anything");
    }
}
