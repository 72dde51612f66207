//! Event Transport
//!
//! The seam between the connector and the network. The connector only needs
//! "open this URL and give me a byte stream"; [`HttpTransport`] does it over
//! HTTP, tests substitute a scripted transport.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL};

use crate::error::StreamError;

/// Request header carrying the resume point
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Body chunks of an open event stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Opens event streams
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open `url`, resuming after `last_event_id` when given
    ///
    /// Resolves once the response headers are in; the body is read
    /// incrementally through the returned stream.
    async fn open(&self, url: &str, last_event_id: Option<&str>)
        -> Result<ByteStream, StreamError>;
}

/// Streaming HTTP transport
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTransport {
    /// Build a transport
    ///
    /// The client has a connect timeout but no overall response timeout, so
    /// a stream may stay open for as long as the execution runs.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Connect`] if the HTTP client cannot be built.
    pub fn new(token: Option<String>, connect_timeout: Duration) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::Connect(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn headers(&self, last_event_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if let Some(token) = &self.token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("bearer token contains invalid header characters"),
            }
        }

        if let Some(id) = last_event_id {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert(LAST_EVENT_ID_HEADER, value);
            }
        }

        headers
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn open(
        &self,
        url: &str,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError> {
        tracing::debug!(url, ?last_event_id, "opening event stream");

        let response = self
            .client
            .get(url)
            .headers(self.headers(last_event_id))
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
