// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    VectorIndex,
    Storage,
}

// --- Provider types ---

/// A single chat message sent to an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// "system", "user" or "assistant".
    pub role: String,
    /// Plain text content.
    pub content: String,
}

/// A non-streaming completion request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model identifier.
    pub model: String,
    /// Optional system prompt, sent ahead of `messages`.
    pub system_prompt: Option<String>,
    /// Conversation messages.
    pub messages: Vec<ProviderMessage>,
    /// JSON Schema the response must conform to, when the backend supports it.
    pub response_schema: Option<serde_json::Value>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completed provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Provider-assigned response id.
    pub id: String,
    /// Text of the first choice.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Token usage, if reported.
    pub usage: TokenUsage,
}

// --- Embedding types ---

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter, one vector per input text in order.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

// --- Vector index types ---

/// A vector stored in an index collection.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    /// Arbitrary JSON object; filters match against its top-level keys.
    pub payload: serde_json::Value,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Equality filter on a top-level string payload key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFilter {
    pub key: String,
    pub value: String,
}

impl PayloadFilter {
    /// Matches points whose `payload[key] == value`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Evaluates the filter against a payload.
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        payload
            .get(&self.key)
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == self.value)
    }
}
