// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end memory tests.
//!
//! `TestHarness` assembles a complete `MemoryService` over a temp SQLite
//! database, a `MockProvider` behind the real `LlmExtractor`, a
//! `MockEmbedder` and a `ManualClock`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use keepsake_config::model::{MaintenanceConfig, MemoryConfig};
use keepsake_core::types::VectorPoint;
use keepsake_core::{KeepsakeError, VectorIndexAdapter};
use keepsake_memory::{
    LlmExtractor, ManualClock, MemoryIndex, MemoryRecord, MemoryService, MemoryStore,
    ServiceParts,
};
use keepsake_storage::{Database, SqliteVectorIndex};

use crate::mock_embedder::MockEmbedder;
use crate::mock_provider::MockProvider;

/// Fixed starting point for the harness clock.
pub fn harness_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    memory: MemoryConfig,
    maintenance: MaintenanceConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            memory: MemoryConfig {
                idle_timeout_secs: 1,
                extraction_timeout_secs: 5,
                ..MemoryConfig::default()
            },
            maintenance: MaintenanceConfig {
                enabled: false,
                ..MaintenanceConfig::default()
            },
        }
    }

    /// Set mock provider responses, consumed one per extraction cycle.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_memory_config(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_maintenance_config(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Build the harness. Must run inside a tokio runtime.
    pub async fn build(self) -> Result<TestHarness, KeepsakeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| KeepsakeError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("keepsake.db");
        let db = Database::open(&db_path.to_string_lossy(), true).await?;

        let provider = Arc::new(MockProvider::with_responses(self.responses));
        let embedder = Arc::new(MockEmbedder::new());
        let vectors = Arc::new(SqliteVectorIndex::new(db.clone()));
        let clock = Arc::new(ManualClock::new(harness_epoch()));

        let extractor = Arc::new(LlmExtractor::new(
            provider.clone(),
            "mock-model",
            1024,
            Duration::from_secs(self.memory.extraction_timeout_secs),
        ));
        let service = MemoryService::from_parts(
            &db,
            ServiceParts {
                extractor,
                embedder: embedder.clone(),
                vector_index: vectors.clone(),
                clock: clock.clone(),
            },
            &self.memory,
            &self.maintenance,
        );

        let store = Arc::new(MemoryStore::new(&db, clock.clone()));
        let index = Arc::new(MemoryIndex::new(
            vectors.clone(),
            embedder.clone(),
            self.memory.collection.clone(),
        ));

        Ok(TestHarness {
            service,
            provider,
            embedder,
            vectors,
            clock,
            store,
            index,
            collection: self.memory.collection,
            idle: Duration::from_secs(self.memory.idle_timeout_secs),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete memory stack wired to mocks.
pub struct TestHarness {
    pub service: MemoryService,
    pub provider: Arc<MockProvider>,
    pub embedder: Arc<MockEmbedder>,
    pub vectors: Arc<SqliteVectorIndex>,
    pub clock: Arc<ManualClock>,
    /// Direct store access for seeding and inspection.
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub collection: String,
    pub idle: Duration,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings and the given extraction responses.
    pub async fn with_responses(responses: Vec<String>) -> Result<Self, KeepsakeError> {
        Self::builder().with_mock_responses(responses).build().await
    }

    /// Wait until the buffer is empty and no cycle is running, polling on a
    /// real-time interval. Returns false on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.service.pending_turns().await == 0 && !self.service.is_processing() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the store holds `n` live records. Returns false on timeout.
    pub async fn wait_for_records(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.store.count(false).await.unwrap_or(0) == n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Insert a record directly, with its vector, bypassing consolidation.
    pub async fn seed(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), KeepsakeError> {
        self.embedder.set(&record.content, vector).await;
        let vector = self.index.embed(&record.content).await?;
        self.store.insert(record).await?;
        self.index.upsert(record, vector).await
    }

    /// Write a non-memory entry (for example a document chunk) into the
    /// shared collection.
    pub async fn seed_foreign_point(
        &self,
        id: &str,
        kind: &str,
        vector: &[f32],
    ) -> Result<(), KeepsakeError> {
        let mut padded = vec![0.0; crate::mock_embedder::MOCK_DIMENSIONS];
        for (slot, value) in padded.iter_mut().zip(vector) {
            *slot = *value;
        }
        self.vectors
            .upsert(
                &self.collection,
                vec![VectorPoint {
                    id: id.to_string(),
                    vector: padded,
                    payload: serde_json::json!({ "type": kind }),
                }],
            )
            .await
    }

    /// Ids of memory entries in the vector collection nearest to `vector`.
    pub async fn indexed_ids(&self, vector: &[f32]) -> Result<Vec<String>, KeepsakeError> {
        let mut padded = vec![0.0; crate::mock_embedder::MOCK_DIMENSIONS];
        for (slot, value) in padded.iter_mut().zip(vector) {
            *slot = *value;
        }
        Ok(self
            .index
            .search(&padded, 100)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect())
    }
}

/// A memory record with sensible defaults for seeding.
pub fn record(id: &str, content: &str, category: keepsake_memory::MemoryCategory) -> MemoryRecord {
    let now = harness_epoch();
    MemoryRecord {
        id: id.to_string(),
        content: content.to_string(),
        category,
        importance: 0.5,
        source_type: "conversation".to_string(),
        created_at: now,
        last_accessed: now,
        expires_at: None,
        superseded_by: None,
    }
}
