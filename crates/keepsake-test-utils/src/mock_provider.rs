// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured responses
//! and records every request it receives.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use keepsake_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use keepsake_core::{KeepsakeError, PluginAdapter, ProviderAdapter};

/// Returned when the queue is empty: a valid extraction with nothing in it.
pub const EMPTY_EXTRACTION: &str = r#"{"memories": []}"#;

enum Scripted {
    Text(String),
    Failure(String),
}

/// A mock LLM provider that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty,
/// [`EMPTY_EXTRACTION`] is returned.
pub struct MockProvider {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Mutex<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Scripted::Text).collect()),
            ..Self::new()
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .await
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a provider error.
    pub async fn add_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .await
            .push_back(Scripted::Failure(message.into()));
    }

    /// Delay every completion, to simulate a slow model.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// The user message text of each request, in order.
    pub async fn transcripts(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, KeepsakeError> {
        let model = request.model.clone();
        self.requests.lock().await.push(request);

        let delay = *self.delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().await.pop_front();
        match next {
            Some(Scripted::Failure(message)) => Err(KeepsakeError::Provider {
                message,
                source: None,
            }),
            Some(Scripted::Text(text)) => Ok(response(model, text)),
            None => Ok(response(model, EMPTY_EXTRACTION.to_string())),
        }
    }
}

fn response(model: String, content: String) -> ProviderResponse {
    ProviderResponse {
        id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
        content,
        model,
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
        },
    }
}
