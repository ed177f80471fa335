//! Transport Traits
//!
//! The seam between the session pump and the network. A transport turns a
//! [`StreamRequest`] into a stream of raw byte chunks; everything above it
//! (framing, parsing, reducing) is transport agnostic.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::messages::ConversationId;

/// Raw byte chunks as they come off the wire
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Transport-level errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Request could not be sent or the connection failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The body stream broke after it started
    #[error("Stream interrupted: {0}")]
    Stream(String),
}

/// Which streaming endpoint to call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEndpoint {
    /// Conversational chat
    Chat,
    /// Free-text transaction parsing
    Parse,
}

impl StreamEndpoint {
    /// Path relative to the API base URL
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Chat => "/assistant/chat-stream",
            Self::Parse => "/agent/process-stream",
        }
    }
}

/// Body of a chat request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// User message
    pub message: String,
    /// Account the conversation belongs to
    pub account_id: i64,
    /// Existing conversation to continue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// Body of a parse request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseRequest {
    /// Free text describing transactions
    pub text: String,
    /// Account the transactions belong to
    pub account_id: i64,
}

/// One streaming request
///
/// Serializes as the bare JSON body of the endpoint it targets.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamRequest {
    /// Send a chat message
    Chat(ChatRequest),
    /// Parse free text into transactions
    Parse(ParseRequest),
}

impl StreamRequest {
    /// Endpoint to call
    #[must_use]
    pub fn endpoint(&self) -> StreamEndpoint {
        match self {
            Self::Chat(_) => StreamEndpoint::Chat,
            Self::Parse(_) => StreamEndpoint::Parse,
        }
    }
}

/// Opens streaming requests
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Human-readable transport name for logs
    fn name(&self) -> &str;

    /// Send `request` and return the response body as a byte stream
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}
