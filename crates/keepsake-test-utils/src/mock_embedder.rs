// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter for tests.
//!
//! Texts registered with [`MockEmbedder::set`] get exactly that vector, so a
//! test can pin the similarity between two texts. Anything else is embedded
//! as a normalized bag of hashed words, which keeps related sentences close
//! without a model.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use keepsake_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use keepsake_core::{EmbeddingAdapter, KeepsakeError, PluginAdapter};

pub const MOCK_DIMENSIONS: usize = 16;

#[derive(Default)]
pub struct MockEmbedder {
    fixed: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the vector for `text`. Shorter vectors are zero-padded.
    pub async fn set(&self, text: &str, vector: &[f32]) {
        let mut padded = vec![0.0; MOCK_DIMENSIONS];
        for (slot, value) in padded.iter_mut().zip(vector) {
            *slot = *value;
        }
        self.fixed.lock().await.insert(text.to_string(), padded);
    }

    /// Make every following call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Bag-of-words embedding: each lowercase word lands in a hashed bucket.
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; MOCK_DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % MOCK_DIMENSIONS as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeepsakeError::Embedding {
                message: "mock embedder unavailable".into(),
                source: None,
            });
        }
        let fixed = self.fixed.lock().await;
        let embeddings = input
            .texts
            .iter()
            .map(|t| fixed.get(t).cloned().unwrap_or_else(|| hashed_embedding(t)))
            .collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: MOCK_DIMENSIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pinned_vectors_win() {
        let embedder = MockEmbedder::new();
        embedder.set("hello", &[1.0, 0.0]).await;
        let out = embedder
            .embed(EmbeddingInput {
                texts: vec!["hello".into(), "other text".into()],
            })
            .await
            .unwrap();
        assert_eq!(out.embeddings[0][0], 1.0);
        assert_eq!(out.embeddings[0].len(), MOCK_DIMENSIONS);
        assert_eq!(out.embeddings[1], hashed_embedding("other text"));
        assert_eq!(embedder.call_count(), 1);
    }

    #[test]
    fn hashed_embedding_is_stable_and_normalized() {
        let a = hashed_embedding("User prefers dark mode");
        let b = hashed_embedding("user PREFERS dark mode");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(hashed_embedding("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn failing_mode() {
        let embedder = MockEmbedder::new();
        embedder.set_failing(true);
        let err = embedder
            .embed(EmbeddingInput {
                texts: vec!["x".into()],
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
