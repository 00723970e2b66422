// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures shared by this crate's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use keepsake_core::types::{EmbeddingInput, EmbeddingOutput};
use keepsake_core::{AdapterType, EmbeddingAdapter, HealthStatus, KeepsakeError, PluginAdapter};
use keepsake_storage::{Database, SqliteVectorIndex};
use tempfile::TempDir;

use crate::clock::ManualClock;
use crate::index::MemoryIndex;
use crate::store::MemoryStore;

pub const DIMS: usize = 4;

/// Embedder with hand-picked vectors; unknown texts map to a fixed axis.
#[derive(Default)]
pub struct FixedEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
}

impl FixedEmbedder {
    pub fn set(&self, text: &str, vector: [f32; DIMS]) {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector.to_vec());
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl EmbeddingAdapter for FixedEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeepsakeError::Embedding {
                message: "embedder offline".into(),
                source: None,
            });
        }
        let vectors = self.vectors.lock().unwrap();
        let embeddings = input
            .texts
            .iter()
            .map(|t| {
                vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 0.0, 0.0, 1.0])
            })
            .collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: DIMS,
        })
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub vectors: Arc<SqliteVectorIndex>,
    pub embedder: Arc<FixedEmbedder>,
    pub clock: Arc<ManualClock>,
    pub _dir: TempDir,
}

pub async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("memory.db").to_str().unwrap(), true)
        .await
        .unwrap();
    let clock = Arc::new(ManualClock::new(epoch()));
    let store = Arc::new(MemoryStore::new(&db, clock.clone()));
    let vectors = Arc::new(SqliteVectorIndex::new(db));
    let embedder = Arc::new(FixedEmbedder::default());
    let index = Arc::new(MemoryIndex::new(
        vectors.clone(),
        embedder.clone(),
        "knowledge",
    ));
    Fixture {
        store,
        index,
        vectors,
        embedder,
        clock,
        _dir: dir,
    }
}
