//! Error Types
//!
//! Errors raised while opening, reading and decoding the execution event
//! stream. Decode errors never escape the connector; they are logged and the
//! offending frame is dropped.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the stream connector and its transport
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The connection could not be opened
    #[error("failed to open event stream: {0}")]
    Connect(String),

    /// The server answered with a non-success status
    #[error("event stream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Reading the open stream failed
    #[error("event stream read failed: {0}")]
    Read(String),

    /// The server closed the stream before a terminal event arrived
    #[error("event stream closed before the execution finished")]
    Closed,

    /// The cancellation token fired
    #[error("event stream cancelled")]
    Cancelled,

    /// The overall execution deadline elapsed
    #[error("execution deadline of {0:?} elapsed")]
    DeadlineExceeded(Duration),

    /// The configured maximum number of connect attempts was used up
    #[error("gave up after {attempts} connection attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Description of the last failure
        last: String,
    },
}

impl StreamError {
    /// Whether this error is the cancellation signal rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the connector should try to connect again after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Status { .. } | Self::Read(_) | Self::Closed
        )
    }
}

/// Errors decoding a single wire frame into an [`Event`](crate::events::Event)
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid JSON for the event schema
    #[error("invalid event payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The timestamp matched none of the tolerated formats
    #[error("unparseable timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or malformed
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors fetching the agent directory
///
/// Never fatal: callers fall back to an empty directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The request could not be sent or the client could not be built
    #[error("agent directory request failed: {0}")]
    Request(String),

    /// Non-success status
    #[error("agent directory returned HTTP {0}")]
    Status(u16),

    /// The body was not an agent list
    #[error("agent directory response could not be decoded: {0}")]
    Decode(String),
}
