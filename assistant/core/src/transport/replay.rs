//! Replay Transport
//!
//! Serves pre-recorded responses instead of talking to a backend. Each call
//! to `open` consumes the next queued script. Used to replay captured
//! streams from disk and to drive the pipeline in tests, where a channel
//! script lets the test decide exactly when each chunk arrives.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::traits::{ByteStream, EventTransport, StreamRequest, TransportError};

/// Sender half of a channel script
pub type ChunkSender = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

enum Script {
    Chunks(Vec<Vec<u8>>),
    Channel(mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>),
    Fail(TransportError),
}

/// Transport that plays back queued responses
#[derive(Default)]
pub struct ReplayTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl std::fmt::Debug for ReplayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayTransport")
            .field("queued", &self.scripts.lock().len())
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl ReplayTransport {
    /// Create a transport with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response delivered as the given chunks
    pub fn push_chunks<I, C>(&self, chunks: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let chunks = chunks.into_iter().map(Into::into).collect();
        self.scripts.lock().push_back(Script::Chunks(chunks));
    }

    /// Queue a response cut into `chunk_size`-byte pieces
    pub fn push_bytes(&self, bytes: &[u8], chunk_size: usize) {
        let size = chunk_size.max(1);
        self.push_chunks(bytes.chunks(size).map(<[u8]>::to_vec));
    }

    /// Queue a response whose chunks are fed through the returned sender
    ///
    /// The stream ends when the sender is dropped.
    pub fn push_channel(&self) -> ChunkSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(Script::Channel(rx));
        tx
    }

    /// Queue a request that fails before any bytes arrive
    pub fn push_failure(&self, error: TransportError) {
        self.scripts.lock().push_back(Script::Fail(error));
    }

    /// Requests seen so far, oldest first
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EventTransport for ReplayTransport {
    fn name(&self) -> &str {
        "replay"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());

        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Chunks(chunks)) => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Some(Script::Channel(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Script::Fail(error)) => Err(error),
            None => Err(TransportError::Connect("no recorded response left".to_string())),
        }
    }
}
