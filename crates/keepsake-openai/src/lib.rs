// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters for Keepsake.
//!
//! [`OpenAiProvider`] implements [`ProviderAdapter`] over `/chat/completions`
//! with `json_schema` structured output, and [`OpenAiEmbedder`] implements
//! [`EmbeddingAdapter`] over `/embeddings`.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use keepsake_config::model::{EmbeddingConfig, LlmConfig};
use keepsake_core::error::KeepsakeError;
use keepsake_core::traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
use keepsake_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, ProviderRequest,
    ProviderResponse, TokenUsage,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest, ResponseFormat};

/// Chat completion provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// Creates a provider from the `[llm]` config section.
    pub fn new(config: &LlmConfig) -> Result<Self, KeepsakeError> {
        let client = OpenAiClient::new(
            &config.base_url,
            config.api_key.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_max_retries(config.max_retries);

        info!(base_url = %config.base_url, model = %config.model, "chat provider initialized");
        Ok(Self { client })
    }

    /// Creates a provider with an existing client.
    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_chat_request(request: &ProviderRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: false,
            response_format: request
                .response_schema
                .clone()
                .map(|schema| ResponseFormat::json_schema("response", schema)),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        // Avoid spending tokens on health checks.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, KeepsakeError> {
        let chat_request = Self::to_chat_request(&request);
        let response = self.client.chat_completion(&chat_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| KeepsakeError::Provider {
                message: "response contained no choices".into(),
                source: None,
            })?;
        debug!(
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "completion finished"
        );

        let usage = response.usage.unwrap_or_default();
        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

/// Embedding backend implementing [`EmbeddingAdapter`].
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    /// Creates an embedder from the `[embedding]` config section.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, KeepsakeError> {
        let client = OpenAiClient::new(
            &config.base_url,
            config.api_key.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(base_url = %config.base_url, model = %config.model, "embedder initialized");
        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    /// Creates an embedder with an existing client.
    pub fn with_client(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        match self
            .embed(EmbeddingInput {
                texts: vec!["health check".into()],
            })
            .await
        {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: 0,
            });
        }
        let expected = input.texts.len();
        let response = self
            .client
            .embeddings(&EmbeddingRequest {
                model: self.model.clone(),
                input: input.texts,
            })
            .await?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(KeepsakeError::Embedding {
                message: format!("expected {expected} embeddings, got {}", data.len()),
                source: None,
            });
        }
        data.sort_by_key(|d| d.index);

        let dimensions = data.first().map(|d| d.embedding.len()).unwrap_or(0);
        if data.iter().any(|d| d.embedding.len() != dimensions) {
            return Err(KeepsakeError::Embedding {
                message: "embeddings have inconsistent dimensions".into(),
                source: None,
            });
        }

        Ok(EmbeddingOutput {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            dimensions,
        })
    }
}
