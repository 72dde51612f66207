//! Execution Session
//!
//! Per-run state shared between the network worker and the active sink's
//! render loop. Only the status text and the bounded event log are read
//! across that boundary; everything else is written by the dispatcher.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventType};
use crate::log_buffer::BoundedLog;

/// Default scroll-back capacity
pub const DEFAULT_LOG_CAPACITY: usize = 50;

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of an execution, as seen by this client
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, nothing attempted yet
    #[default]
    Initializing,
    /// Opening the event stream
    Connecting,
    /// At least one event decoded
    Streaming,
    /// Finished successfully (terminal)
    Completed,
    /// Finished with a failure (terminal)
    Failed,
    /// Cancelled locally or server-side (terminal)
    Cancelled,
}

impl ExecutionState {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Get a human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Connecting => "Connecting",
            Self::Streaming => "Streaming",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// How an execution ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Completed
    Success,
    /// Failed (server-reported or connection lost for good)
    Failure,
    /// Cancelled
    Cancelled,
}

impl Outcome {
    /// The terminal state this outcome puts the session in
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        match self {
            Self::Success => ExecutionState::Completed,
            Self::Failure => ExecutionState::Failed,
            Self::Cancelled => ExecutionState::Cancelled,
        }
    }

    /// Short label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of a session, set exactly once
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// How it ended
    pub outcome: Outcome,
    /// Optional explanation (server message or local error)
    pub message: Option<String>,
    /// The terminal event type, when the end was reported by the server
    pub terminal_event: Option<EventType>,
}

impl CompletionResult {
    /// Result derived from a terminal event
    #[must_use]
    pub fn from_event(outcome: Outcome, event: &Event) -> Self {
        let message = Some(event.message.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| event.data.first_str(&["error", "result"]).map(str::to_string));
        Self {
            outcome,
            message,
            terminal_event: Some(event.event_type.clone()),
        }
    }

    /// Result produced locally (cancellation, connection failure)
    #[must_use]
    pub fn local(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: Some(message.into()),
            terminal_event: None,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// State of one watched execution
#[derive(Debug)]
pub struct ExecutionSession {
    /// Execution being watched
    pub execution_id: String,
    /// Display name of the flow, if known
    pub flow_name: Option<String>,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    started: Instant,
    state: ExecutionState,
    log: BoundedLog<Event>,
    completion: Option<CompletionResult>,
    status: String,
    connect_attempts: u32,
    events_delivered: u64,
    last_heartbeat: Option<Instant>,
}

impl ExecutionSession {
    /// Create a session in the `Initializing` state
    pub fn new(execution_id: impl Into<String>, log_capacity: usize) -> Self {
        Self {
            execution_id: execution_id.into(),
            flow_name: None,
            started_at: Utc::now(),
            started: Instant::now(),
            state: ExecutionState::Initializing,
            log: BoundedLog::new(log_capacity),
            completion: None,
            status: ExecutionState::Initializing.description().to_string(),
            connect_attempts: 0,
            events_delivered: 0,
            last_heartbeat: None,
        }
    }

    /// Builder-style flow name
    #[must_use]
    pub fn with_flow_name(mut self, name: impl Into<String>) -> Self {
        self.flow_name = Some(name.into());
        self
    }

    /// Wrap in a shareable handle
    #[must_use]
    pub fn into_handle(self) -> SessionHandle {
        Arc::new(Mutex::new(self))
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Final result, once terminal
    #[must_use]
    pub fn completion(&self) -> Option<&CompletionResult> {
        self.completion.as_ref()
    }

    /// Live status text
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Retained events, oldest first
    #[must_use]
    pub fn log(&self) -> &BoundedLog<Event> {
        &self.log
    }

    /// Connect attempts made so far
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Events delivered to the sink so far
    #[must_use]
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered
    }

    /// When the last keep-alive arrived
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Time since the session was created
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Replace the status text (ignored once terminal)
    pub fn set_status(&mut self, status: impl Into<String>) {
        if !self.state.is_terminal() {
            self.status = status.into();
        }
    }

    /// Record a connect attempt (`Initializing → Connecting`)
    pub fn record_connect_attempt(&mut self, attempt: u32) {
        if self.state.is_terminal() {
            return;
        }
        self.connect_attempts = attempt;
        if self.state == ExecutionState::Initializing {
            self.state = ExecutionState::Connecting;
        }
        self.status = if attempt <= 1 {
            "Connecting".to_string()
        } else {
            format!("Reconnecting (attempt {attempt})")
        };
    }

    /// Record a keep-alive
    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    /// Record a delivered, non-terminal event (`Connecting → Streaming`)
    ///
    /// Returns `false` when the session is already terminal and the event
    /// must not be delivered.
    pub fn record_event(&mut self, event: &Event) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if matches!(
            self.state,
            ExecutionState::Initializing | ExecutionState::Connecting
        ) {
            self.state = ExecutionState::Streaming;
        }
        self.events_delivered += 1;
        self.log.push(event.clone());
        if let Some(status) = status_for(event) {
            self.status = status;
        }
        true
    }

    /// Enter a terminal state
    ///
    /// Returns `false` (and changes nothing) if a terminal state was
    /// already reached.
    pub fn finish(&mut self, result: CompletionResult) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = result.outcome.state();
        self.status = match &result.message {
            Some(message) => format!("{}: {message}", self.state.description()),
            None => self.state.description().to_string(),
        };
        self.completion = Some(result);
        true
    }
}

/// Shared handle to a session
pub type SessionHandle = Arc<Mutex<ExecutionSession>>;

/// Status text implied by an event, if it changes the status
fn status_for(event: &Event) -> Option<String> {
    let step = || {
        event
            .data
            .first_str(&["step_name", "name"])
            .or(event.step_id.as_deref())
            .map(str::to_string)
    };
    match event.event_type {
        EventType::ExecutionStarted => Some("Running".to_string()),
        EventType::StepStarted => Some(match step() {
            Some(step) => format!("Running: {step}"),
            None => "Running step".to_string(),
        }),
        EventType::ToolCallStarted => event
            .data
            .first_str(&["tool_name", "tool"])
            .map(|tool| format!("Calling tool: {tool}")),
        EventType::LlmResponse => Some("Thinking".to_string()),
        _ => None,
    }
}
