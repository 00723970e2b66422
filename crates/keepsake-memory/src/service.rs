// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public entry point wiring the memory components together.

use std::sync::Arc;
use std::time::Duration;

use keepsake_config::model::{KeepsakeConfig, MaintenanceConfig, MemoryConfig};
use keepsake_core::error::KeepsakeError;
use keepsake_core::traits::{EmbeddingAdapter, ProviderAdapter, VectorIndexAdapter};
use keepsake_storage::{Database, SqliteVectorIndex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::consolidator::Consolidator;
use crate::extractor::{LlmExtractor, MemoryExtractor};
use crate::index::MemoryIndex;
use crate::maintenance::{spawn_maintenance_loop, MaintenanceJob, MaintenanceParams};
use crate::pipeline::MemoryPipeline;
use crate::policy::DuplicatePolicy;
use crate::retriever::MemoryRetriever;
use crate::scheduler::ExtractionScheduler;
use crate::store::{ListFilter, MemoryStore};
use crate::tracker::AccessTracker;
use crate::types::{
    BufferedTurn, CandidateMemory, ConsolidationOutcome, FlushReport, FormattedContext,
    MaintenanceResult, MemoryCategory, MemoryRecord, Role,
};

/// Source type for facts the user asked to remember.
pub const EXPLICIT_SOURCE: &str = "explicit";

/// Importance given to explicit facts when the caller does not choose one.
pub const EXPLICIT_IMPORTANCE: f64 = 0.8;

const REMEMBER_PREFIXES: &[&str] = &[
    "remember this:",
    "remember that:",
    "remember:",
    "remember this",
    "remember that",
    "please remember",
];

/// Strip a leading "remember that ..." style instruction.
pub fn strip_remember_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    for prefix in REMEMBER_PREFIXES {
        if let Some(head) = trimmed.get(..prefix.len())
            && head.eq_ignore_ascii_case(prefix)
        {
            let rest = &trimmed[prefix.len()..];
            // Only strip whole words: "remembering" stays intact.
            if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == ':') {
                return rest.trim_start_matches(':').trim();
            }
        }
    }
    trimmed
}

/// Collaborators that tests and alternative deployments may swap out.
pub struct ServiceParts {
    pub extractor: Arc<dyn MemoryExtractor>,
    pub embedder: Arc<dyn EmbeddingAdapter>,
    pub vector_index: Arc<dyn VectorIndexAdapter>,
    pub clock: Arc<dyn Clock>,
}

/// The conversational memory subsystem.
///
/// Must be created inside a tokio runtime; the access tracker is spawned on
/// construction.
pub struct MemoryService {
    enabled: bool,
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    consolidator: Arc<Consolidator>,
    scheduler: ExtractionScheduler,
    retriever: MemoryRetriever,
    tracker: Arc<AccessTracker>,
    maintenance: Arc<MaintenanceJob>,
    maintenance_params: MaintenanceParams,
    maintenance_interval: Duration,
    maintenance_enabled: bool,
    retrieval_limit: usize,
    min_score: f32,
    clock: Arc<dyn Clock>,
}

impl MemoryService {
    /// Production wiring: LLM extraction, SQLite vector index, system clock.
    pub fn new(
        db: &Database,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: &KeepsakeConfig,
    ) -> Self {
        let extractor = Arc::new(LlmExtractor::new(
            provider,
            config.llm.model.clone(),
            config.llm.max_tokens,
            Duration::from_secs(config.memory.extraction_timeout_secs),
        ));
        let parts = ServiceParts {
            extractor,
            embedder,
            vector_index: Arc::new(SqliteVectorIndex::new(db.clone())),
            clock: Arc::new(SystemClock),
        };
        Self::from_parts(db, parts, &config.memory, &config.maintenance)
    }

    pub fn from_parts(
        db: &Database,
        parts: ServiceParts,
        memory: &MemoryConfig,
        maintenance: &MaintenanceConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::new(db, parts.clock.clone()));
        let index = Arc::new(MemoryIndex::new(
            parts.vector_index,
            parts.embedder,
            memory.collection.clone(),
        ));
        let consolidator = Arc::new(Consolidator::new(
            store.clone(),
            index.clone(),
            DuplicatePolicy::lexical(memory.duplicate_threshold),
            parts.clock.clone(),
            chrono::Duration::try_days(memory.temporal_ttl_days).unwrap_or(chrono::Duration::MAX),
        ));
        let pipeline = Arc::new(MemoryPipeline::new(parts.extractor, consolidator.clone()));
        let scheduler =
            ExtractionScheduler::new(pipeline, Duration::from_secs(memory.idle_timeout_secs));
        let tracker = Arc::new(AccessTracker::spawn(store.clone()));
        let retriever = MemoryRetriever::new(
            store.clone(),
            index.clone(),
            tracker.clone(),
            parts.clock.clone(),
        );
        let job = Arc::new(MaintenanceJob::new(
            store.clone(),
            index.clone(),
            maintenance.history_retention_days,
        ));

        Self {
            enabled: memory.enabled,
            store,
            index,
            consolidator,
            scheduler,
            retriever,
            tracker,
            maintenance: job,
            maintenance_params: MaintenanceParams::from(maintenance),
            maintenance_interval: Duration::from_secs(maintenance.interval_hours.saturating_mul(3600)),
            maintenance_enabled: maintenance.enabled,
            retrieval_limit: memory.retrieval_limit,
            min_score: memory.min_score,
            clock: parts.clock,
        }
    }

    /// Buffer a conversation turn for later extraction.
    pub async fn submit_turn(&self, role: Role, content: &str, source: &str) {
        if !self.enabled {
            return;
        }
        self.scheduler
            .submit_turn(BufferedTurn {
                role,
                content: content.to_string(),
                source: source.to_string(),
                timestamp: self.clock.now(),
            })
            .await;
    }

    /// Extract from everything buffered now instead of waiting for idle.
    pub async fn force_flush(&self) -> FlushReport {
        self.scheduler.force_flush().await
    }

    pub async fn pending_turns(&self) -> usize {
        self.scheduler.pending_turns().await
    }

    /// True while an extraction cycle is running.
    pub fn is_processing(&self) -> bool {
        self.scheduler.is_processing()
    }

    /// Ranked memories for a query, rendered for prompt injection.
    pub async fn query_memories(&self, query: &str, limit: usize, min_score: f32) -> FormattedContext {
        if !self.enabled {
            return FormattedContext::default();
        }
        self.retriever.query(query, limit, min_score).await
    }

    /// [`query_memories`](Self::query_memories) with the configured limit and score floor.
    pub async fn query(&self, query: &str) -> FormattedContext {
        self.query_memories(query, self.retrieval_limit, self.min_score)
            .await
    }

    pub async fn run_maintenance(
        &self,
        decay_factor: f64,
        min_importance: f64,
        stale_days: i64,
    ) -> MaintenanceResult {
        self.maintenance
            .run(MaintenanceParams {
                decay_factor,
                min_importance,
                stale_days,
            })
            .await
    }

    /// Start the periodic maintenance loop, or `None` when disabled.
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.maintenance_enabled {
            debug!("maintenance loop disabled");
            return None;
        }
        info!(interval = ?self.maintenance_interval, "maintenance loop started");
        Some(spawn_maintenance_loop(
            self.maintenance.clone(),
            self.maintenance_params,
            self.maintenance_interval,
            cancel,
        ))
    }

    /// Consolidate a user-stated fact right away.
    pub async fn remember(
        &self,
        content: &str,
        category: Option<MemoryCategory>,
        importance: Option<f64>,
    ) -> Result<ConsolidationOutcome, KeepsakeError> {
        let content = strip_remember_prefix(content);
        if content.is_empty() {
            return Err(KeepsakeError::Validation(
                "nothing to remember after stripping the instruction".into(),
            ));
        }
        let candidate = CandidateMemory::new(
            content,
            category.unwrap_or(MemoryCategory::Factual),
            importance.unwrap_or(EXPLICIT_IMPORTANCE),
        );
        self.consolidator
            .consolidate(&candidate, EXPLICIT_SOURCE)
            .await
    }

    pub async fn list_memories(&self, filter: &ListFilter) -> Result<Vec<MemoryRecord>, KeepsakeError> {
        self.store.list(filter).await
    }

    pub async fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>, KeepsakeError> {
        self.store.get(id).await
    }

    /// Hard-delete a record and its vector entry. Returns false if it did not exist.
    pub async fn delete_memory(&self, id: &str) -> Result<bool, KeepsakeError> {
        let deleted = self.store.delete(id).await?;
        if deleted && let Err(e) = self.index.delete(&[id.to_string()]).await {
            warn!(id, error = %e, "record deleted but vector entry remains");
        }
        Ok(deleted)
    }

    pub async fn count(&self, include_superseded: bool) -> Result<usize, KeepsakeError> {
        self.store.count(include_superseded).await
    }

    /// Flush buffered turns, stop the idle timer and drain access updates.
    pub async fn shutdown(&self) -> FlushReport {
        let report = self.scheduler.force_flush().await;
        self.scheduler.cancel();
        self.tracker.settle().await;
        info!(turns = report.turns, stored = report.stored, "memory service stopped");
        report
    }
}
