//! Stream Connector
//!
//! Opens the execution event stream, decodes frames and hands each event to
//! an [`EventHandler`], reconnecting after failures until the handler sees a
//! terminal event, the cancellation token fires, or the deadline passes.
//!
//! # Termination
//!
//! The handler decides when the stream is done by returning
//! [`ControlFlow::Break`]. From that moment the connector returns `Ok`
//! immediately: frames already buffered behind the terminal event are not
//! delivered and any later transport error is never observed, so completion
//! is signalled exactly once.
//!
//! # Ordering
//!
//! Events are handed over one at a time, in wire order, from the read loop
//! itself. The connector never spawns per-event work; decoupling a slow
//! consumer is the handler's business (see `dispatcher::QueuedSink`).

use std::ops::ControlFlow;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::events::Event;
use crate::transport::{ByteStream, EventTransport};
use crate::wire::{decode_frame, Decoded, FrameDecoder, RawFrame};

/// Default delay between connect attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default overall deadline for one watch
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

/// Stand-in horizon for deadlines too large to represent as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Retry and deadline policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Fixed wait between attempts
    pub retry_delay: Duration,
    /// Overall deadline measured from the first attempt
    pub deadline: Duration,
    /// Maximum connect attempts (0 = unlimited)
    pub max_attempts: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            deadline: DEFAULT_DEADLINE,
            max_attempts: 0,
        }
    }
}

/// Counters for a stream that ended with a terminal event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Connect attempts made
    pub attempts: u32,
    /// Events decoded and handed over
    pub events: u64,
    /// Keep-alives received
    pub heartbeats: u64,
}

/// Receives what the connector reads
pub trait EventHandler: Send {
    /// A connect attempt is about to start (1-based)
    fn on_connect_attempt(&mut self, _attempt: u32) {}

    /// A keep-alive arrived
    fn on_heartbeat(&mut self) {}

    /// A decoded event, in wire order
    ///
    /// Return [`ControlFlow::Break`] once the stream is finished.
    fn on_event(&mut self, event: Event) -> ControlFlow<()>;
}

/// Reconnecting reader of one execution's event stream
#[derive(Debug)]
pub struct StreamConnector<T> {
    transport: T,
    config: ConnectorConfig,
}

impl<T: EventTransport> StreamConnector<T> {
    /// Create a connector
    pub fn new(transport: T, config: ConnectorConfig) -> Self {
        Self { transport, config }
    }

    /// Read `endpoint` until the handler breaks
    ///
    /// `execution_id` fills in events whose payload omits it.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Cancelled`] when `cancel` fires
    /// - [`StreamError::DeadlineExceeded`] when the deadline passes
    /// - [`StreamError::RetriesExhausted`] when `max_attempts` is used up
    pub async fn connect<H>(
        &self,
        endpoint: &str,
        execution_id: &str,
        cancel: &CancellationToken,
        handler: &mut H,
    ) -> Result<StreamSummary, StreamError>
    where
        H: EventHandler + ?Sized,
    {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.deadline)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut summary = StreamSummary::default();
        let mut last_event_id: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(StreamError::DeadlineExceeded(self.config.deadline));
            }

            summary.attempts += 1;
            let attempt = summary.attempts;
            handler.on_connect_attempt(attempt);
            tracing::debug!(attempt, execution_id, "connecting to event stream");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = sleep_until(deadline) => {
                    return Err(StreamError::DeadlineExceeded(self.config.deadline));
                }
                opened = self.transport.open(endpoint, last_event_id.as_deref()) => opened,
            };

            let failure = match opened {
                Ok(stream) => {
                    tracing::info!(attempt, execution_id, "event stream open");
                    let pumped = self
                        .pump(
                            stream,
                            execution_id,
                            cancel,
                            deadline,
                            handler,
                            &mut summary,
                            &mut last_event_id,
                        )
                        .await;
                    match pumped {
                        Ok(()) => return Ok(summary),
                        Err(err) => err,
                    }
                }
                Err(err) => err,
            };

            if !failure.is_retryable() {
                return Err(failure);
            }

            if self.config.max_attempts > 0 && attempt >= self.config.max_attempts {
                tracing::warn!(attempt, error = %failure, "giving up on event stream");
                return Err(StreamError::RetriesExhausted {
                    attempts: attempt,
                    last: failure.to_string(),
                });
            }

            tracing::warn!(
                attempt,
                error = %failure,
                retry_in_ms = self.config.retry_delay.as_millis() as u64,
                "event stream interrupted, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = sleep_until(deadline) => {
                    return Err(StreamError::DeadlineExceeded(self.config.deadline));
                }
                _ = sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Read one open stream
    ///
    /// `Ok(())` means the handler saw the end; any `Err` ends this attempt.
    #[allow(clippy::too_many_arguments)]
    async fn pump<H>(
        &self,
        mut stream: ByteStream,
        execution_id: &str,
        cancel: &CancellationToken,
        deadline: Instant,
        handler: &mut H,
        summary: &mut StreamSummary,
        last_event_id: &mut Option<String>,
    ) -> Result<(), StreamError>
    where
        H: EventHandler + ?Sized,
    {
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = sleep_until(deadline) => {
                    return Err(StreamError::DeadlineExceeded(self.config.deadline));
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    decoder.push(&bytes);
                    while let Some(frame) = decoder.next_frame() {
                        let flow =
                            deliver(&frame, execution_id, handler, summary, last_event_id);
                        if flow.is_break() {
                            return Ok(());
                        }
                    }
                }
                Some(Err(err)) => return Err(err),
                None => {
                    if let Some(frame) = decoder.finish() {
                        let flow = deliver(&frame, execution_id, handler, summary, last_event_id);
                        if flow.is_break() {
                            return Ok(());
                        }
                    }
                    return Err(StreamError::Closed);
                }
            }
        }
    }
}

/// Decode one frame and hand the result to the handler
fn deliver<H>(
    frame: &RawFrame,
    execution_id: &str,
    handler: &mut H,
    summary: &mut StreamSummary,
    last_event_id: &mut Option<String>,
) -> ControlFlow<()>
where
    H: EventHandler + ?Sized,
{
    match decode_frame(frame) {
        Ok(Decoded::Event(mut event)) => {
            if event.execution_id.is_empty() {
                event.execution_id = execution_id.to_string();
            }
            if let Some(id) = &event.id {
                *last_event_id = Some(id.clone());
            }
            summary.events += 1;
            handler.on_event(event)
        }
        Ok(Decoded::Heartbeat) => {
            summary.heartbeats += 1;
            handler.on_heartbeat();
            ControlFlow::Continue(())
        }
        Ok(Decoded::Skip) => ControlFlow::Continue(()),
        Err(err) => {
            tracing::debug!(error = %err, "dropping undecodable frame");
            ControlFlow::Continue(())
        }
    }
}
