// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based extraction of candidate memories from a transcript.
//!
//! The extractor never fails: timeouts, provider errors and malformed output
//! are logged and yield zero candidates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_core::traits::ProviderAdapter;
use keepsake_core::types::{ProviderMessage, ProviderRequest};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{clamp_importance, parse_timestamp, BufferedTurn, CandidateMemory, MemoryCategory};

/// Turns a transcript into candidate memories.
#[async_trait]
pub trait MemoryExtractor: Send + Sync + 'static {
    async fn extract(&self, transcript: &str) -> Vec<CandidateMemory>;
}

/// System prompt for memory extraction.
const EXTRACTION_PROMPT: &str = r#"You maintain long-term memory about the user of a personal assistant.
Read the conversation and extract facts about the user worth remembering in future conversations.

For each fact return:
- "content": a standalone statement, e.g. "The user prefers dark mode"
- "category": one of factual, preference, relationship, temporal
- "importance": a number from 0 to 1
- "expires_at": ISO 8601 timestamp, only for temporal facts such as deadlines or appointments

Only include facts stated or clearly implied by the user. Skip small talk and
anything the assistant said about itself. If nothing is worth remembering,
return an empty list.

Respond with JSON only: {"memories": [...]}"#;

/// JSON Schema sent as the structured-output constraint.
pub fn extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "content": {"type": "string"},
                        "category": {
                            "type": "string",
                            "enum": ["factual", "preference", "relationship", "temporal"]
                        },
                        "importance": {"type": "number", "minimum": 0, "maximum": 1},
                        "expires_at": {"type": ["string", "null"]}
                    },
                    "required": ["content", "category", "importance"]
                }
            }
        },
        "required": ["memories"]
    })
}

/// Render buffered turns as `User: ...` / `Assistant: ...` lines.
pub fn build_transcript(turns: &[BufferedTurn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        let content = turn.content.trim();
        if content.is_empty() {
            continue;
        }
        transcript.push_str(turn.role.label());
        transcript.push_str(": ");
        transcript.push_str(content);
        transcript.push('\n');
    }
    transcript
}

/// A raw item as the model returns it; every field is optional.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    importance: Option<serde_json::Value>,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Wrapped { memories: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Parse the LLM extraction response into normalized candidates.
///
/// Handles a bare array, a `{"memories": [...]}` object, markdown code fences
/// and surrounding prose. Items that fail to parse are dropped individually.
pub fn parse_extraction_response(response: &str) -> Vec<CandidateMemory> {
    let json_str = locate_json(response);

    let items = match serde_json::from_str::<RawResponse>(json_str) {
        Ok(RawResponse::Wrapped { memories }) => memories,
        Ok(RawResponse::Bare(items)) => items,
        Err(e) => {
            warn!("Failed to parse extraction response: {e}");
            debug!("Raw response: {response}");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawCandidate>(item) {
            Ok(raw) => normalize(raw),
            Err(e) => {
                debug!("Dropping malformed extraction item: {e}");
                None
            }
        })
        .collect()
}

/// Find the outermost JSON object or array in a response.
///
/// A `{"memories": ...}` object wins over any earlier bracket in prose.
fn locate_json(response: &str) -> &str {
    let trimmed = response.trim();
    let wrapped = trimmed
        .match_indices('{')
        .map(|(i, _)| i)
        .find(|&i| trimmed[i + 1..].trim_start().starts_with("\"memories\""));
    let start = match (wrapped, trimmed.find('{'), trimmed.find('[')) {
        (Some(w), _, _) => w,
        (None, Some(o), Some(a)) => o.min(a),
        (None, Some(o), None) => o,
        (None, None, Some(a)) => a,
        (None, None, None) => return trimmed,
    };
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    match trimmed.rfind(close) {
        Some(end) if end > start => &trimmed[start..=end],
        _ => &trimmed[start..],
    }
}

fn normalize(raw: RawCandidate) -> Option<CandidateMemory> {
    let content = raw.content?.trim().to_string();
    if content.is_empty() {
        return None;
    }
    let category = raw
        .category
        .as_deref()
        .map(MemoryCategory::from_str_value)
        .unwrap_or(MemoryCategory::Factual);
    let importance = clamp_importance(raw.importance.as_ref().and_then(importance_value));
    let expires_at: Option<DateTime<Utc>> = raw.expires_at.as_deref().and_then(parse_timestamp);

    Some(CandidateMemory {
        content,
        category,
        importance,
        expires_at,
    })
}

/// Models sometimes quote numbers.
fn importance_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Production extractor backed by a [`ProviderAdapter`].
pub struct LlmExtractor {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    fn build_request(&self, transcript: &str) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            system_prompt: Some(EXTRACTION_PROMPT.to_string()),
            messages: vec![ProviderMessage {
                role: "user".to_string(),
                content: format!("Conversation:\n{transcript}"),
            }],
            response_schema: Some(extraction_schema()),
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl MemoryExtractor for LlmExtractor {
    async fn extract(&self, transcript: &str) -> Vec<CandidateMemory> {
        if transcript.trim().is_empty() {
            return Vec::new();
        }
        let request = self.build_request(transcript);

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "memory extraction call failed");
                metrics::counter!("keepsake_extraction_failures_total", "reason" => "provider")
                    .increment(1);
                return Vec::new();
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "memory extraction timed out");
                metrics::counter!("keepsake_extraction_failures_total", "reason" => "timeout")
                    .increment(1);
                return Vec::new();
            }
        };

        let candidates = parse_extraction_response(&response.content);
        debug!(
            candidates = candidates.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "extraction complete"
        );
        candidates
    }
}
