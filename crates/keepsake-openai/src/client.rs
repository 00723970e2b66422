// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible endpoints.
//!
//! Provides [`OpenAiClient`] which handles request construction, optional
//! bearer authentication, a client-level timeout, and transient error retry.

use std::time::Duration;

use keepsake_core::KeepsakeError;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
};

/// Which endpoint a request targets; decides the error variant reported.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Chat,
    Embeddings,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "chat/completions",
            Endpoint::Embeddings => "embeddings",
        }
    }

    fn error(
        self,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> KeepsakeError {
        match self {
            Endpoint::Chat => KeepsakeError::Provider { message, source },
            Endpoint::Embeddings => KeepsakeError::Embedding { message, source },
        }
    }
}

/// HTTP client for an OpenAI-compatible API.
///
/// Works against OpenAI itself, Ollama's `/v1` surface, and other servers
/// that speak the same chat completions and embeddings protocol.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `api_key` is sent as a bearer token when present.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, KeepsakeError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    KeepsakeError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| KeepsakeError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: 0,
        })
    }

    /// Sets how many times a transient failure (429, 5xx) is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a non-streaming chat completion.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, KeepsakeError> {
        self.post_json(Endpoint::Chat, request).await
    }

    /// Requests embeddings for a batch of texts.
    pub async fn embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, KeepsakeError> {
        self.post_json(Endpoint::Embeddings, request).await
    }

    async fn post_json<Req, Resp>(&self, endpoint: Endpoint, body: &Req) -> Result<Resp, KeepsakeError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, url = %url, "retrying request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = match self.client.post(&url).json(body).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(KeepsakeError::Timeout {
                        duration: self.timeout,
                    });
                }
                Err(e) => {
                    return Err(endpoint.error(
                        format!("HTTP request failed: {e}"),
                        Some(Box::new(e)),
                    ));
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, url = %url, "response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| {
                    endpoint.error(
                        format!("failed to read response body: {e}"),
                        Some(Box::new(e)),
                    )
                })?;
                return serde_json::from_str(&text).map_err(|e| {
                    endpoint.error(
                        format!("failed to parse API response: {e}"),
                        Some(Box::new(e)),
                    )
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(endpoint.error(format!("API returned {status}: {body}"), None));
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(endpoint.error(message, None));
        }

        Err(last_error
            .unwrap_or_else(|| endpoint.error("request failed after retries".into(), None)))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}
