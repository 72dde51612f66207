//! Event Dispatcher
//!
//! Sits between the connector and the active sink. For every decoded event
//! it filters heartbeats, advances the session's state machine, and forwards
//! the event to the sink in wire order:
//!
//! ```text
//! Initializing ─attempt─▶ Connecting ─event─▶ Streaming ─┬─▶ Completed
//!                                                        ├─▶ Failed
//!                                                        └─▶ Cancelled
//! ```
//!
//! Terminal states are sticky. Nothing is delivered after a terminal event
//! and the sink's `on_finish` is called exactly once.
//!
//! Two dispatch disciplines share this one implementation:
//!
//! - **inline**: the dispatcher owns the sink and calls it from the read
//!   loop, so the next frame is not read until the sink returns
//! - **queued**: the dispatcher owns a [`QueuedSink`] that pushes into a
//!   single-consumer channel; one consumer drains it in order

use std::ops::ControlFlow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::connector::{EventHandler, StreamConnector, StreamSummary};
use crate::error::{ConfigError, StreamError};
use crate::events::Event;
use crate::session::{CompletionResult, Outcome, SessionHandle};
use crate::transport::EventTransport;

/// A consumer of dispatched events (one presentation mode)
pub trait EventSink: Send {
    /// A non-heartbeat event, in delivery order
    fn on_event(&mut self, event: &Event);

    /// The session ended; no more events will follow
    fn on_finish(&mut self, result: &CompletionResult);
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn on_event(&mut self, event: &Event) {
        (**self).on_event(event);
    }

    fn on_finish(&mut self, result: &CompletionResult) {
        (**self).on_finish(result);
    }
}

/// Where the sink runs relative to the network read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Sink runs on the read loop
    #[default]
    Inline,
    /// Sink runs on its own consumer behind an ordered queue
    Queued,
}

impl DispatchMode {
    /// Config/CLI spelling
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Queued => "queued",
        }
    }
}

impl FromStr for DispatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "queued" => Ok(Self::Queued),
            other => Err(ConfigError::Invalid(format!(
                "dispatch must be \"inline\" or \"queued\", got {other:?}"
            ))),
        }
    }
}

/// What happened to one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Keep-alive, recorded but not delivered
    Heartbeat,
    /// Delivered to the sink
    Delivered,
    /// Delivered, and it ended the session
    Terminal(Outcome),
    /// Dropped because the session had already ended
    AfterTerminal,
}

/// Routes events from the connector into the session and a sink
#[derive(Debug)]
pub struct Dispatcher<S> {
    session: SessionHandle,
    sink: S,
    finish_sent: bool,
}

impl<S: EventSink> Dispatcher<S> {
    /// Create a dispatcher
    pub fn new(session: SessionHandle, sink: S) -> Self {
        Self {
            session,
            sink,
            finish_sent: false,
        }
    }

    /// Session being updated
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Take the sink back
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process one event
    pub fn dispatch(&mut self, event: Event) -> Dispatched {
        if event.is_heartbeat() {
            self.session.lock().record_heartbeat();
            return Dispatched::Heartbeat;
        }

        let terminal = event.event_type.terminal_outcome();

        // Session lock is released before the sink runs
        let accepted = {
            let mut session = self.session.lock();
            let accepted = session.record_event(&event);
            if accepted {
                if let Some(outcome) = terminal {
                    session.finish(CompletionResult::from_event(outcome, &event));
                }
            }
            accepted
        };

        if !accepted {
            tracing::debug!(event_type = %event.event_type, "ignoring event after terminal state");
            return Dispatched::AfterTerminal;
        }

        self.sink.on_event(&event);

        match terminal {
            Some(outcome) => {
                tracing::info!(
                    execution_id = %event.execution_id,
                    outcome = %outcome,
                    "execution reached terminal state"
                );
                let result = CompletionResult::from_event(outcome, &event);
                self.notify_finish(&result);
                Dispatched::Terminal(outcome)
            }
            None => Dispatched::Delivered,
        }
    }

    /// Apply the connector's final result
    ///
    /// A terminal event already recorded wins over anything the connector
    /// reports afterwards. Otherwise cancellation becomes `Cancelled` and any
    /// other error becomes `Failed`.
    pub fn conclude(&mut self, result: Result<StreamSummary, StreamError>) -> CompletionResult {
        let fallback = match &result {
            Ok(_) => CompletionResult::local(
                Outcome::Failure,
                "event stream ended without a terminal event",
            ),
            Err(err) if err.is_cancelled() => {
                CompletionResult::local(Outcome::Cancelled, "watch cancelled")
            }
            Err(err) => CompletionResult::local(Outcome::Failure, err.to_string()),
        };

        let completion = {
            let mut session = self.session.lock();
            if session.finish(fallback.clone()) {
                match &result {
                    Err(err) if err.is_cancelled() => tracing::info!("watch cancelled"),
                    Err(err) => tracing::warn!(error = %err, "event stream failed"),
                    Ok(_) => tracing::warn!("event stream ended without a terminal event"),
                }
            } else if let Err(err) = &result {
                tracing::debug!(error = %err, "discarding stream error after terminal event");
            }
            session.completion().cloned().unwrap_or(fallback)
        };

        self.notify_finish(&completion);
        completion
    }

    fn notify_finish(&mut self, result: &CompletionResult) {
        if !self.finish_sent {
            self.finish_sent = true;
            self.sink.on_finish(result);
        }
    }
}

impl<S: EventSink> EventHandler for Dispatcher<S> {
    fn on_connect_attempt(&mut self, attempt: u32) {
        self.session.lock().record_connect_attempt(attempt);
    }

    fn on_heartbeat(&mut self) {
        self.session.lock().record_heartbeat();
    }

    fn on_event(&mut self, event: Event) -> ControlFlow<()> {
        match self.dispatch(event) {
            Dispatched::Terminal(_) | Dispatched::AfterTerminal => ControlFlow::Break(()),
            Dispatched::Heartbeat | Dispatched::Delivered => ControlFlow::Continue(()),
        }
    }
}

// ============================================================================
// Queued discipline
// ============================================================================

/// Message on the ordered hand-off queue
#[derive(Clone, Debug)]
pub enum SinkMessage {
    /// A delivered event
    Event(Event),
    /// The session ended
    Finished(CompletionResult),
}

/// Producer half of the ordered hand-off
///
/// Never blocks the read loop; the queue is drained by exactly one consumer.
#[derive(Clone, Debug)]
pub struct QueuedSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl QueuedSink {
    /// Create the producer and its single consumer end
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for QueuedSink {
    fn on_event(&mut self, event: &Event) {
        if self.tx.send(SinkMessage::Event(event.clone())).is_err() {
            tracing::debug!("sink queue closed, dropping event");
        }
    }

    fn on_finish(&mut self, result: &CompletionResult) {
        if self.tx.send(SinkMessage::Finished(result.clone())).is_err() {
            tracing::debug!("sink queue closed, dropping completion");
        }
    }
}

/// Feed queued messages into `sink` until the session finishes or the
/// producer goes away
pub fn drain_queue<S: EventSink>(mut rx: mpsc::UnboundedReceiver<SinkMessage>, mut sink: S) -> S {
    while let Some(message) = rx.blocking_recv() {
        match message {
            SinkMessage::Event(event) => sink.on_event(&event),
            SinkMessage::Finished(result) => {
                sink.on_finish(&result);
                break;
            }
        }
    }
    sink
}

/// Read the stream into `sink` through a fresh [`Dispatcher`]
///
/// Every discipline ends up here; queued callers pass a [`QueuedSink`] and
/// drain its receiver wherever their consumer runs.
pub async fn stream_into<T, S>(
    connector: &StreamConnector<T>,
    endpoint: &str,
    cancel: &CancellationToken,
    session: SessionHandle,
    sink: S,
) -> (CompletionResult, S)
where
    T: EventTransport,
    S: EventSink,
{
    let execution_id = session.lock().execution_id.clone();
    let mut dispatcher = Dispatcher::new(session, sink);
    let result = connector
        .connect(endpoint, &execution_id, cancel, &mut dispatcher)
        .await;
    let completion = dispatcher.conclude(result);
    (completion, dispatcher.into_sink())
}

/// Watch one execution end to end with the chosen dispatch discipline
///
/// Returns the completion result and the sink. In queued mode the sink runs
/// on a blocking worker so a slow terminal never stalls the network read.
///
/// # Errors
///
/// Returns the [`JoinError`] if the queued sink's worker panicked.
pub async fn run_pipeline<T, S>(
    connector: &StreamConnector<T>,
    endpoint: &str,
    cancel: &CancellationToken,
    session: SessionHandle,
    sink: S,
    mode: DispatchMode,
) -> Result<(CompletionResult, S), JoinError>
where
    T: EventTransport,
    S: EventSink + 'static,
{
    tracing::debug!(
        execution_id = %session.lock().execution_id,
        mode = mode.as_str(),
        "starting pipeline"
    );

    match mode {
        DispatchMode::Inline => Ok(stream_into(connector, endpoint, cancel, session, sink).await),
        DispatchMode::Queued => {
            let (queue, rx) = QueuedSink::channel();
            let consumer = tokio::task::spawn_blocking(move || drain_queue(rx, sink));

            let (completion, queue) = stream_into(connector, endpoint, cancel, session, queue).await;
            drop(queue);

            let sink = consumer.await?;
            Ok((completion, sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::connector::ConnectorConfig;
    use crate::events::EventType;
    use crate::session::{ExecutionSession, ExecutionState};
    use crate::test_utils::{Attempt, Chunk, ScriptedTransport};

    #[derive(Debug, Default)]
    struct Collect {
        events: Vec<EventType>,
        finished: Vec<CompletionResult>,
    }

    impl EventSink for Collect {
        fn on_event(&mut self, event: &Event) {
            self.events.push(event.event_type.clone());
        }

        fn on_finish(&mut self, result: &CompletionResult) {
            self.finished.push(result.clone());
        }
    }

    fn session() -> SessionHandle {
        ExecutionSession::new("exec-1", 10).into_handle()
    }

    fn block(event_type: &str) -> String {
        format!("data: {{\"event_type\":\"{event_type}\"}}\n\n")
    }

    fn connector(attempts: Vec<Attempt>) -> StreamConnector<ScriptedTransport> {
        StreamConnector::new(
            ScriptedTransport::new(attempts),
            ConnectorConfig {
                retry_delay: Duration::from_millis(5),
                deadline: Duration::from_secs(5),
                max_attempts: 3,
            },
        )
    }

    #[test]
    fn test_heartbeat_not_delivered() {
        let mut dispatcher = Dispatcher::new(session(), Collect::default());
        let outcome = dispatcher.dispatch(Event::new(EventType::Heartbeat, ""));

        assert_eq!(outcome, Dispatched::Heartbeat);
        assert!(dispatcher.sink().events.is_empty());
        assert!(dispatcher.session().lock().last_heartbeat().is_some());
        assert_eq!(dispatcher.session().lock().state(), ExecutionState::Initializing);
    }

    #[test]
    fn test_terminal_event_finishes_once() {
        let mut dispatcher = Dispatcher::new(session(), Collect::default());
        dispatcher.on_connect_attempt(1);

        assert_eq!(
            dispatcher.dispatch(Event::new(EventType::StepStarted, "")),
            Dispatched::Delivered
        );
        assert_eq!(
            dispatcher.session().lock().state(),
            ExecutionState::Streaming
        );
        assert_eq!(
            dispatcher.dispatch(Event::new(EventType::ExecutionCompleted, "all done")),
            Dispatched::Terminal(Outcome::Success)
        );
        assert_eq!(
            dispatcher.dispatch(Event::new(EventType::StepStarted, "")),
            Dispatched::AfterTerminal
        );

        let completion = dispatcher.conclude(Err(StreamError::Read("reset".into())));
        assert_eq!(completion.outcome, Outcome::Success);
        assert_eq!(completion.message.as_deref(), Some("all done"));

        let sink = dispatcher.into_sink();
        assert_eq!(
            sink.events,
            vec![EventType::StepStarted, EventType::ExecutionCompleted]
        );
        assert_eq!(sink.finished.len(), 1);
    }

    #[test]
    fn test_cancellation_is_not_failure() {
        let mut dispatcher = Dispatcher::new(session(), Collect::default());
        let completion = dispatcher.conclude(Err(StreamError::Cancelled));

        assert_eq!(completion.outcome, Outcome::Cancelled);
        assert_eq!(completion.terminal_event, None);
        assert_eq!(
            dispatcher.session().lock().state(),
            ExecutionState::Cancelled
        );
    }

    #[test]
    fn test_connection_failure_fails_session() {
        let mut dispatcher = Dispatcher::new(session(), Collect::default());
        let completion = dispatcher.conclude(Err(StreamError::RetriesExhausted {
            attempts: 3,
            last: "connection refused".into(),
        }));

        assert_eq!(completion.outcome, Outcome::Failure);
        assert_eq!(dispatcher.session().lock().state(), ExecutionState::Failed);
        assert_eq!(dispatcher.sink().finished.len(), 1);
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("Queued".parse::<DispatchMode>().unwrap(), DispatchMode::Queued);
        assert_eq!(" inline ".parse::<DispatchMode>().unwrap(), DispatchMode::Inline);
        assert!("parallel".parse::<DispatchMode>().is_err());
    }

    #[tokio::test]
    async fn test_inline_and_queued_deliver_same_order() {
        let script = || {
            vec![
                Attempt::refused(),
                Attempt::Body(vec![
                    Chunk::text(block("execution_started")),
                    Chunk::text("data: ping\n\n"),
                    Chunk::text(block("step_started") + &block("llm_response")),
                    Chunk::text(block("step_completed")),
                    Chunk::text(block("execution_completed")),
                    Chunk::Fail(StreamError::Read("reset".into())),
                ]),
            ]
        };
        let expected = vec![
            EventType::ExecutionStarted,
            EventType::StepStarted,
            EventType::LlmResponse,
            EventType::StepCompleted,
            EventType::ExecutionCompleted,
        ];

        for mode in [DispatchMode::Inline, DispatchMode::Queued] {
            let session = session();
            let (completion, sink) = run_pipeline(
                &connector(script()),
                "mem://",
                &CancellationToken::new(),
                session.clone(),
                Collect::default(),
                mode,
            )
            .await
            .unwrap();

            assert_eq!(completion.outcome, Outcome::Success, "{mode:?}");
            assert_eq!(sink.events, expected, "{mode:?}");
            assert_eq!(sink.finished.len(), 1, "{mode:?}");
            assert_eq!(session.lock().connect_attempts(), 2, "{mode:?}");
            assert_eq!(session.lock().events_delivered(), 5, "{mode:?}");
        }
    }

    #[tokio::test]
    async fn test_queued_pipeline_reports_failure() {
        let (completion, sink) = run_pipeline(
            &connector(vec![]),
            "mem://",
            &CancellationToken::new(),
            session(),
            Collect::default(),
            DispatchMode::Queued,
        )
        .await
        .unwrap();

        assert_eq!(completion.outcome, Outcome::Failure);
        assert!(sink.events.is_empty());
        assert_eq!(sink.finished, vec![completion]);
    }

    #[tokio::test]
    async fn test_queue_ends_with_single_finish() {
        let (queue, mut rx) = QueuedSink::channel();
        let (completion, queue) = stream_into(
            &connector(vec![Attempt::blocks([
                block("step_started"),
                block("execution_failed"),
                block("step_completed"),
            ])]),
            "mem://",
            &CancellationToken::new(),
            session(),
            queue,
        )
        .await;
        drop(queue);

        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }

        assert_eq!(completion.outcome, Outcome::Failure);
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], SinkMessage::Event(e) if e.event_type == EventType::StepStarted));
        assert!(matches!(&messages[1], SinkMessage::Event(e) if e.event_type == EventType::ExecutionFailed));
        assert!(matches!(&messages[2], SinkMessage::Finished(r) if *r == completion));
    }
}
