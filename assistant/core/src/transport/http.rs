//! HTTP Transport
//!
//! Streams events from the assistant backend over a chunked HTTP response.
//!
//! # Backend API
//!
//! - `POST {base}/assistant/chat-stream` - conversational chat
//! - `POST {base}/agent/process-stream` - free-text transaction parsing
//!
//! Both take a JSON body and answer with `text/event-stream`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;

use super::auth::Credentials;
use super::traits::{ByteStream, EventTransport, StreamEndpoint, StreamRequest, TransportError};
use crate::config::AssistantConfig;

/// Longest error body kept in a [`TransportError::Status`]
const MAX_ERROR_BODY: usize = 1024;

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming transport over reqwest
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// API base URL, without trailing slash
    base_url: String,
    /// Bearer token source
    credentials: Credentials,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `base_url`
    ///
    /// Only the connect phase is bounded; a reply may stream for as long as
    /// the agent needs.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self, TransportError> {
        Self::with_connect_timeout(base_url, credentials, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a transport with an explicit connect timeout
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the HTTP client cannot be built.
    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        credentials: Credentials,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, credentials, http_client))
    }

    /// Create a transport around an existing client
    pub fn with_client(
        base_url: impl Into<String>,
        credentials: Credentials,
        http_client: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            credentials,
            http_client,
        }
    }

    /// Create from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the HTTP client cannot be built.
    pub fn from_config(config: &AssistantConfig, credentials: Credentials) -> Result<Self, TransportError> {
        Self::with_connect_timeout(config.api_base_url.clone(), credentials, config.connect_timeout)
    }

    /// Full URL of an endpoint
    #[must_use]
    pub fn url(&self, endpoint: StreamEndpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let url = self.url(request.endpoint());
        tracing::debug!(%url, "Opening event stream");

        let mut builder = self
            .http_client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(token) = self.credentials.bearer() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            truncate(&mut body, MAX_ERROR_BODY);
            tracing::warn!(%url, status, "Event stream rejected");
            return Err(TransportError::Status { status, body });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Stream(e.to_string()))
        });
        Ok(stream.boxed())
    }
}

fn truncate(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
