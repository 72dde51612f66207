//! Scripted transport for tests
//!
//! Each call to `open` consumes the next scripted attempt: either a connect
//! failure, or a body made of byte chunks and read errors. When the script
//! runs out, further attempts fail to connect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::StreamError;
use crate::transport::{ByteStream, EventTransport};

/// One item of a scripted body
#[derive(Clone, Debug)]
pub enum Chunk {
    /// Bytes delivered to the reader
    Data(Bytes),
    /// A read failure
    Fail(StreamError),
    /// Body stays open until the reader gives up
    Hang,
}

impl Chunk {
    /// Text chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self::Data(Bytes::from(text.into()))
    }
}

/// One scripted connect attempt
#[derive(Clone, Debug)]
pub enum Attempt {
    /// `open` fails with this error
    Refuse(StreamError),
    /// `open` succeeds and the body yields these chunks, then ends
    Body(Vec<Chunk>),
}

impl Attempt {
    /// Connection refused
    #[must_use]
    pub fn refused() -> Self {
        Self::Refuse(StreamError::Connect("connection refused".into()))
    }

    /// Body from whole text blocks
    pub fn blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Body(blocks.into_iter().map(Chunk::text).collect())
    }
}

/// In-memory [`EventTransport`] driven by a script
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Attempt>>>,
    attempts: Arc<AtomicUsize>,
    resume_ids: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedTransport {
    /// Transport that plays `attempts` in order
    pub fn new(attempts: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Arc::new(Mutex::new(attempts.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Number of `open` calls so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// `Last-Event-ID` passed to each `open` call, in order
    #[must_use]
    pub fn resume_ids(&self) -> Vec<Option<String>> {
        self.resume_ids.lock().clone()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(
        &self,
        _url: &str,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, StreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.resume_ids
            .lock()
            .push(last_event_id.map(str::to_string));

        let next = self.script.lock().pop_front();
        match next {
            None => Err(StreamError::Connect("script exhausted".into())),
            Some(Attempt::Refuse(err)) => Err(err),
            Some(Attempt::Body(chunks)) => {
                let stream = futures::stream::unfold(
                    chunks.into_iter(),
                    |mut chunks| async move {
                        match chunks.next()? {
                            Chunk::Data(bytes) => Some((Ok(bytes), chunks)),
                            Chunk::Fail(err) => Some((Err(err), chunks)),
                            Chunk::Hang => {
                                futures::future::pending::<()>().await;
                                None
                            }
                        }
                    },
                );
                Ok(Box::pin(stream))
            }
        }
    }
}
