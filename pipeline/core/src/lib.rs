//! Flowwatch Core - Headless Execution Event Pipeline
//!
//! This crate follows a remote flow execution through its server-pushed
//! event stream, completely independent of any terminal UI. It decodes the
//! wire format, reconnects on failure, tracks the execution's lifecycle,
//! resolves agent identities and sanitizes model output. Rendering is left
//! to whichever [`EventSink`] the caller plugs in.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (text/event-stream)
//!            │
//!   ┌────────┴─────────┐
//!   │  EventTransport  │  open(url, last_event_id) -> byte stream
//!   └────────┬─────────┘
//!   ┌────────┴─────────┐
//!   │ StreamConnector  │  frames -> Event, retry / cancel / deadline
//!   └────────┬─────────┘
//!   ┌────────┴─────────┐
//!   │    Dispatcher    │  heartbeat filter, state machine, session log
//!   └────────┬─────────┘
//!            │ inline, or through QueuedSink (one ordered queue)
//!   ┌────────┴─────────┐
//!   │    EventSink     │  EventView::build -> resolver + sanitizer
//!   └──────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamConnector`]: reconnecting reader of one execution's stream
//! - [`Dispatcher`]: drives the [`ExecutionSession`] state machine
//! - [`EventSink`]: what a render mode implements
//! - [`EventView`]: presentation-neutral digest of one event
//! - [`WatchConfig`]: layered configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use flowwatch_core::{
//!     load_config, run_pipeline, ExecutionSession, HttpTransport, StreamConnector,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let config = load_config()?;
//! let transport = HttpTransport::new(config.token.clone(), config.connect_timeout)?;
//! let connector = StreamConnector::new(transport, config.connector_config());
//! let session = ExecutionSession::new("exec-1", config.log_capacity).into_handle();
//!
//! let (completion, _sink) = run_pipeline(
//!     &connector,
//!     &config.stream_url("exec-1"),
//!     &CancellationToken::new(),
//!     session,
//!     my_sink,
//!     config.dispatch,
//! )
//! .await?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connector;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod log_buffer;
pub mod resolver;
pub mod sanitize;
pub mod session;
pub mod transport;
pub mod view;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigOverrides, ConfigSource,
    WatchConfig,
};
pub use connector::{ConnectorConfig, EventHandler, StreamConnector, StreamSummary};
pub use directory::{AgentDirectory, AgentDirectoryEntry, DirectoryClient};
pub use dispatcher::{
    drain_queue, run_pipeline, stream_into, DispatchMode, Dispatched, Dispatcher, EventSink,
    QueuedSink, SinkMessage,
};
pub use error::{ConfigError, DecodeError, DirectoryError, StreamError};
pub use events::{Event, EventData, EventType};
pub use log_buffer::BoundedLog;
pub use resolver::{resolve, AgentIdentity};
pub use sanitize::{sanitize, sanitize_status};
pub use session::{
    CompletionResult, ExecutionSession, ExecutionState, Outcome, SessionHandle,
};
pub use transport::{ByteStream, EventTransport, HttpTransport};
pub use view::{truncate_field, EventView, Tone};
