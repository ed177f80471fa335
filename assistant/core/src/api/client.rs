//! JSON REST client
//!
//! Small wrapper over reqwest shared by every resource handle: joins paths
//! onto the API base URL, attaches the bearer token, maps non-success
//! statuses to [`ApiError::Status`] and treats `204 No Content` as an empty
//! body.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::resources::{CategoriesApi, ConversationsApi, TagsApi, TransactionsApi};
use crate::config::AssistantConfig;
use crate::transport::Credentials;

/// Longest error body kept in an [`ApiError::Status`]
const MAX_ERROR_BODY: usize = 1024;

/// REST errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network, timeout or decoding failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// A body was expected but the API sent none
    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

/// Authenticated JSON client for the finance API
#[derive(Clone, Debug)]
pub struct ApiClient {
    /// API base URL, without trailing slash
    base_url: String,
    /// Bearer token source
    credentials: Credentials,
    /// HTTP client
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create a client with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            http_client,
        })
    }

    /// Create from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Request` if the HTTP client cannot be built.
    pub fn from_config(config: &AssistantConfig, credentials: Credentials) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), credentials, config.request_timeout)
    }

    /// Full URL of `path`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The transactions resource, creating on behalf of `user_id`
    #[must_use]
    pub fn transactions(&self, user_id: i64) -> TransactionsApi {
        TransactionsApi::new(self.clone(), user_id)
    }

    /// The categories resource
    #[must_use]
    pub fn categories(&self) -> CategoriesApi {
        CategoriesApi::new(self.clone())
    }

    /// The tags resource
    #[must_use]
    pub fn tags(&self) -> TagsApi {
        TagsApi::new(self.clone())
    }

    /// The conversation history resource
    #[must_use]
    pub fn conversations(&self) -> ConversationsApi {
        ConversationsApi::new(self.clone())
    }

    /// GET `path` and decode the JSON body
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-success statuses, empty or undecodable
    /// bodies.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let response = self.execute(self.http_client.get(self.url(path))).await?;
        read_json(path, response).await
    }

    /// POST `body` to `path` and decode the JSON reply
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-success statuses, empty or undecodable
    /// bodies.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .execute(self.http_client.post(self.url(path)).json(body))
            .await?;
        read_json(path, response).await
    }

    /// DELETE `path`, ignoring any body
    ///
    /// # Errors
    ///
    /// Fails on transport errors and non-success statuses.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.http_client.delete(self.url(path))).await?;
        Ok(())
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let builder = match self.credentials.bearer() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            tracing::warn!(status, %body, "API request failed");
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }
}

async fn read_json<R: DeserializeOwned>(path: &str, response: Response) -> Result<R, ApiError> {
    if response.status() == StatusCode::NO_CONTENT {
        return Err(ApiError::EmptyResponse(path.to_string()));
    }
    Ok(response.json().await?)
}
