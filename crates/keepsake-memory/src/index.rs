// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory view over a shared vector collection.
//!
//! Other producers (document chunks, for instance) may write to the same
//! collection, so every entry written here is tagged `type = "memory"` and
//! every search filters on that tag.

use std::sync::Arc;

use keepsake_core::error::KeepsakeError;
use keepsake_core::traits::{EmbeddingAdapter, VectorIndexAdapter};
use keepsake_core::types::{EmbeddingInput, PayloadFilter, VectorMatch, VectorPoint};

use crate::types::{format_timestamp, MemoryRecord};

/// Payload tag that marks memory entries.
pub const MEMORY_TYPE: &str = "memory";

pub struct MemoryIndex {
    index: Arc<dyn VectorIndexAdapter>,
    embedder: Arc<dyn EmbeddingAdapter>,
    collection: String,
}

impl MemoryIndex {
    pub fn new(
        index: Arc<dyn VectorIndexAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, KeepsakeError> {
        let output = self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| KeepsakeError::Embedding {
                message: "embedding returned no results".into(),
                source: None,
            })
    }

    /// Nearest memory entries, best first.
    pub async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, KeepsakeError> {
        let filter = PayloadFilter::new("type", MEMORY_TYPE);
        self.index
            .search(&self.collection, vector, top_k, Some(&filter))
            .await
    }

    /// Write the entry for a record under the record's id.
    pub async fn upsert(&self, record: &MemoryRecord, vector: Vec<f32>) -> Result<(), KeepsakeError> {
        let point = VectorPoint {
            id: record.id.clone(),
            vector,
            payload: payload_for(record),
        };
        self.index.upsert(&self.collection, vec![point]).await
    }

    pub async fn delete(&self, ids: &[String]) -> Result<(), KeepsakeError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.index.delete(&self.collection, ids).await
    }
}

/// Payload mirrored from the record.
pub fn payload_for(record: &MemoryRecord) -> serde_json::Value {
    serde_json::json!({
        "type": MEMORY_TYPE,
        "category": record.category.as_str(),
        "importance": record.importance,
        "created_at": format_timestamp(&record.created_at),
    })
}
