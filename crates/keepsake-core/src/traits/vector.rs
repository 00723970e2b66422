// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index adapter trait.

use async_trait::async_trait;

use crate::error::KeepsakeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PayloadFilter, VectorMatch, VectorPoint};

/// Adapter for a collection-scoped vector index.
///
/// Collections may be shared between unrelated producers, so readers are
/// expected to pass a [`PayloadFilter`] that selects their own entries.
#[async_trait]
pub trait VectorIndexAdapter: PluginAdapter {
    /// Inserts or replaces points by id.
    async fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), KeepsakeError>;

    /// Returns up to `top_k` matches ordered by descending similarity.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<VectorMatch>, KeepsakeError>;

    /// Deletes points by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), KeepsakeError>;
}
