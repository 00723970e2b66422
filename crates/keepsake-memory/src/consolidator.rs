// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store, skip or supersede: deciding what a candidate does to memory.

use std::sync::Arc;

use keepsake_core::error::KeepsakeError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::index::MemoryIndex;
use crate::policy::{DuplicatePolicy, Verdict};
use crate::store::MemoryStore;
use crate::types::{CandidateMemory, ConsolidationOutcome, MemoryCategory, MemoryRecord};

/// Importance added to a record when a duplicate of it is seen again.
pub const BOOST_AMOUNT: f64 = 0.1;

/// What to do with a candidate, before any write happens.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Store,
    Skip { existing: MemoryRecord },
    Supersede { old: MemoryRecord },
}

pub struct Consolidator {
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    policy: DuplicatePolicy,
    clock: Arc<dyn Clock>,
    temporal_ttl: chrono::Duration,
}

impl Consolidator {
    pub fn new(
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        policy: DuplicatePolicy,
        clock: Arc<dyn Clock>,
        temporal_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            index,
            policy,
            clock,
            temporal_ttl,
        }
    }

    /// Embed, decide and apply one candidate.
    pub async fn consolidate(
        &self,
        candidate: &CandidateMemory,
        source_type: &str,
    ) -> Result<ConsolidationOutcome, KeepsakeError> {
        let embedding = self.index.embed(&candidate.content).await?;
        let decision = self.decide(candidate, &embedding).await?;
        let outcome = self.apply(decision, candidate, source_type, embedding).await?;

        let action = match &outcome {
            ConsolidationOutcome::Stored { .. } => "store",
            ConsolidationOutcome::Skipped { .. } => "skip",
            ConsolidationOutcome::Superseded { .. } => "supersede",
        };
        metrics::counter!("keepsake_memory_actions_total", "action" => action).increment(1);
        debug!(action, id = %outcome.record_id(), "candidate consolidated");
        Ok(outcome)
    }

    /// Carry out a decision. A target that changed since `decide` falls back
    /// to storing the candidate as a new record.
    pub(crate) async fn apply(
        &self,
        decision: Decision,
        candidate: &CandidateMemory,
        source_type: &str,
        embedding: Vec<f32>,
    ) -> Result<ConsolidationOutcome, KeepsakeError> {
        Ok(match decision {
            Decision::Skip { existing } => {
                if self.store.boost(&existing.id, BOOST_AMOUNT).await? {
                    ConsolidationOutcome::Skipped {
                        existing_id: existing.id,
                    }
                } else {
                    debug!(id = %existing.id, "duplicate target changed before boost; storing");
                    self.store_new(candidate, source_type, embedding).await?
                }
            }
            Decision::Supersede { old } => {
                self.supersede(old, candidate, source_type, embedding).await?
            }
            Decision::Store => self.store_new(candidate, source_type, embedding).await?,
        })
    }

    /// Classify a candidate against its nearest live neighbor.
    pub async fn decide(
        &self,
        candidate: &CandidateMemory,
        embedding: &[f32],
    ) -> Result<Decision, KeepsakeError> {
        let Some(top) = self.index.search(embedding, 1).await?.into_iter().next() else {
            return Ok(Decision::Store);
        };
        if !self.policy.is_near(top.score) {
            return Ok(Decision::Store);
        }

        let existing = match self.store.get(&top.id).await? {
            Some(record) if !record.is_superseded() => record,
            Some(_) => {
                debug!(id = %top.id, "nearest neighbor already superseded");
                return Ok(Decision::Store);
            }
            None => {
                debug!(id = %top.id, "nearest neighbor has no record");
                return Ok(Decision::Store);
            }
        };

        Ok(match self.policy.judge(candidate, &existing) {
            Verdict::Equivalent => Decision::Skip { existing },
            Verdict::Contradicts => Decision::Supersede { old: existing },
            Verdict::Distinct => Decision::Store,
        })
    }

    fn new_record(&self, candidate: &CandidateMemory, source_type: &str) -> MemoryRecord {
        let now = self.clock.now();
        let expires_at = match candidate.category {
            MemoryCategory::Temporal => candidate.expires_at.or_else(|| {
                let default = now.checked_add_signed(self.temporal_ttl);
                if default.is_none() {
                    warn!(ttl = %self.temporal_ttl, "temporal TTL out of range; storing without expiry");
                }
                default
            }),
            _ => None,
        };
        MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content: candidate.content.clone(),
            category: candidate.category,
            importance: candidate.importance.clamp(0.0, 1.0),
            source_type: source_type.to_string(),
            created_at: now,
            last_accessed: now,
            expires_at,
            superseded_by: None,
        }
    }

    /// Insert the record, then its vector; the insert is undone if indexing fails.
    async fn persist(&self, record: &MemoryRecord, embedding: Vec<f32>) -> Result<(), KeepsakeError> {
        self.store.insert(record).await?;
        if let Err(e) = self.index.upsert(record, embedding).await {
            if let Err(rollback) = self.store.delete(&record.id).await {
                warn!(id = %record.id, error = %rollback, "failed to roll back unindexed record");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn store_new(
        &self,
        candidate: &CandidateMemory,
        source_type: &str,
        embedding: Vec<f32>,
    ) -> Result<ConsolidationOutcome, KeepsakeError> {
        let record = self.new_record(candidate, source_type);
        self.persist(&record, embedding).await?;
        Ok(ConsolidationOutcome::Stored { id: record.id })
    }

    async fn supersede(
        &self,
        old: MemoryRecord,
        candidate: &CandidateMemory,
        source_type: &str,
        embedding: Vec<f32>,
    ) -> Result<ConsolidationOutcome, KeepsakeError> {
        let record = self.new_record(candidate, source_type);
        self.persist(&record, embedding).await?;

        if !self.store.supersede(&old.id, &record.id).await? {
            debug!(old = %old.id, "superseded target changed; new record stands alone");
            return Ok(ConsolidationOutcome::Stored { id: record.id });
        }
        if let Err(e) = self.index.delete(std::slice::from_ref(&old.id)).await {
            warn!(id = %old.id, error = %e, "failed to remove superseded vector entry");
        }
        Ok(ConsolidationOutcome::Superseded {
            old_id: old.id,
            new_id: record.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{epoch, fixture, Fixture};
    use keepsake_core::VectorIndexAdapter;

    fn consolidator(f: &Fixture) -> Consolidator {
        Consolidator::new(
            f.store.clone(),
            f.index.clone(),
            DuplicatePolicy::lexical(0.9),
            f.clock.clone(),
            chrono::Duration::days(7),
        )
    }

    #[tokio::test]
    async fn distinct_candidate_is_stored_and_indexed() {
        let f = fixture().await;
        f.embedder.set("The user prefers dark mode", [1.0, 0.0, 0.0, 0.0]);
        let c = consolidator(&f);

        let candidate = CandidateMemory::new("The user prefers dark mode", MemoryCategory::Preference, 0.6);
        let outcome = c.consolidate(&candidate, "conversation").await.unwrap();
        let ConsolidationOutcome::Stored { id } = outcome else {
            panic!("expected store, got {outcome:?}");
        };

        let record = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.category, MemoryCategory::Preference);
        assert_eq!(record.importance, 0.6);
        assert_eq!(record.source_type, "conversation");
        assert_eq!(record.created_at, epoch());
        assert!(record.expires_at.is_none());

        let hits = f.index.search(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].payload["category"], "preference");
    }

    #[tokio::test]
    async fn repeated_candidate_is_skipped_and_boosted() {
        let f = fixture().await;
        f.embedder.set("User likes tea", [0.0, 1.0, 0.0, 0.0]);
        let c = consolidator(&f);
        let candidate = CandidateMemory::new("User likes tea", MemoryCategory::Preference, 0.5);

        let first = c.consolidate(&candidate, "conversation").await.unwrap();
        let second = c.consolidate(&candidate, "conversation").await.unwrap();
        assert_eq!(
            second,
            ConsolidationOutcome::Skipped {
                existing_id: first.record_id().to_string()
            }
        );
        assert_eq!(f.store.count(true).await.unwrap(), 1);
        let record = f.store.get(first.record_id()).await.unwrap().unwrap();
        assert!((record.importance - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn contradiction_supersedes_and_drops_old_vector() {
        let f = fixture().await;
        f.embedder.set("Project deadline is Monday", [0.0, 0.0, 1.0, 0.0]);
        f.embedder.set("Project deadline is Friday", [0.0, 0.1, 1.0, 0.0]);
        let c = consolidator(&f);

        let old = c
            .consolidate(
                &CandidateMemory::new("Project deadline is Monday", MemoryCategory::Temporal, 0.7),
                "conversation",
            )
            .await
            .unwrap();
        let new = c
            .consolidate(
                &CandidateMemory::new("Project deadline is Friday", MemoryCategory::Temporal, 0.7),
                "conversation",
            )
            .await
            .unwrap();

        let ConsolidationOutcome::Superseded { old_id, new_id } = new else {
            panic!("expected supersede, got {new:?}");
        };
        assert_eq!(old_id, old.record_id());

        let old_record = f.store.get(&old_id).await.unwrap().unwrap();
        assert_eq!(old_record.superseded_by.as_deref(), Some(new_id.as_str()));

        let hits = f.index.search(&[0.0, 0.0, 1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), [new_id.as_str()]);

        let new_record = f.store.get(&new_id).await.unwrap().unwrap();
        assert_eq!(
            new_record.expires_at,
            Some(epoch() + chrono::Duration::days(7)),
            "temporal records get the default TTL"
        );
    }

    #[tokio::test]
    async fn below_threshold_is_stored_separately() {
        let f = fixture().await;
        f.embedder.set("User likes tea", [1.0, 0.0, 0.0, 0.0]);
        f.embedder.set("User likes coffee", [0.6, 0.8, 0.0, 0.0]);
        let c = consolidator(&f);

        c.consolidate(&CandidateMemory::new("User likes tea", MemoryCategory::Preference, 0.5), "conversation")
            .await
            .unwrap();
        let second = c
            .consolidate(&CandidateMemory::new("User likes coffee", MemoryCategory::Preference, 0.5), "conversation")
            .await
            .unwrap();
        assert!(matches!(second, ConsolidationOutcome::Stored { .. }));
        assert_eq!(f.store.count(false).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn orphaned_neighbor_falls_back_to_store() {
        let f = fixture().await;
        f.embedder.set("User likes tea", [1.0, 0.0, 0.0, 0.0]);
        let c = consolidator(&f);
        let candidate = CandidateMemory::new("User likes tea", MemoryCategory::Preference, 0.5);

        let first = c.consolidate(&candidate, "conversation").await.unwrap();
        // Record deleted behind the index's back.
        assert!(f.store.delete(first.record_id()).await.unwrap());

        let decision = c.decide(&candidate, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
        assert_eq!(decision, Decision::Store);
        let second = c.consolidate(&candidate, "conversation").await.unwrap();
        assert!(matches!(second, ConsolidationOutcome::Stored { .. }));
    }

    #[tokio::test]
    async fn skip_target_deleted_after_decide_is_stored() {
        let f = fixture().await;
        f.embedder.set("User likes tea", [1.0, 0.0, 0.0, 0.0]);
        let c = consolidator(&f);
        let candidate = CandidateMemory::new("User likes tea", MemoryCategory::Preference, 0.5);
        let first = c.consolidate(&candidate, "conversation").await.unwrap();

        let embedding = vec![1.0, 0.0, 0.0, 0.0];
        let decision = c.decide(&candidate, &embedding).await.unwrap();
        assert!(matches!(decision, Decision::Skip { .. }));
        assert!(f.store.delete(first.record_id()).await.unwrap());

        let outcome = c.apply(decision, &candidate, "conversation", embedding).await.unwrap();
        let ConsolidationOutcome::Stored { id } = outcome else {
            panic!("expected store, got {outcome:?}");
        };
        assert_ne!(id, first.record_id());
        assert_eq!(f.store.count(true).await.unwrap(), 1);
        assert!(f.store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn supersede_target_replaced_after_decide_stands_alone() {
        let f = fixture().await;
        f.embedder.set("Project deadline is Monday", [0.0, 0.0, 1.0, 0.0]);
        let c = consolidator(&f);
        let old = c
            .consolidate(
                &CandidateMemory::new("Project deadline is Monday", MemoryCategory::Temporal, 0.7),
                "conversation",
            )
            .await
            .unwrap();

        let candidate = CandidateMemory::new("Project deadline is Friday", MemoryCategory::Temporal, 0.7);
        let embedding = vec![0.0, 0.1, 1.0, 0.0];
        let decision = c.decide(&candidate, &embedding).await.unwrap();
        assert!(matches!(decision, Decision::Supersede { .. }));
        // Another writer replaced the record first.
        assert!(f.store.supersede(old.record_id(), "elsewhere").await.unwrap());

        let outcome = c.apply(decision, &candidate, "conversation", embedding).await.unwrap();
        let ConsolidationOutcome::Stored { id } = outcome else {
            panic!("expected store, got {outcome:?}");
        };
        let old_record = f.store.get(old.record_id()).await.unwrap().unwrap();
        assert_eq!(old_record.superseded_by.as_deref(), Some("elsewhere"));
        assert!(f.store.get(&id).await.unwrap().unwrap().superseded_by.is_none());
    }

    #[tokio::test]
    async fn negated_fact_supersedes_instead_of_boosting() {
        let f = fixture().await;
        f.embedder.set("User likes coffee", [0.0, 1.0, 0.0, 0.0]);
        f.embedder.set("User no longer likes coffee", [0.0, 1.0, 0.2, 0.0]);
        let c = consolidator(&f);

        let old = c
            .consolidate(&CandidateMemory::new("User likes coffee", MemoryCategory::Preference, 0.5), "conversation")
            .await
            .unwrap();
        let new = c
            .consolidate(
                &CandidateMemory::new("User no longer likes coffee", MemoryCategory::Preference, 0.6),
                "conversation",
            )
            .await
            .unwrap();

        let ConsolidationOutcome::Superseded { old_id, .. } = new else {
            panic!("expected supersede, got {new:?}");
        };
        assert_eq!(old_id, old.record_id());
        let old_record = f.store.get(&old_id).await.unwrap().unwrap();
        assert_eq!(old_record.importance, 0.5);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_stores_without_expiry() {
        let f = fixture().await;
        let c = Consolidator::new(
            f.store.clone(),
            f.index.clone(),
            DuplicatePolicy::lexical(0.9),
            f.clock.clone(),
            chrono::Duration::MAX,
        );
        let outcome = c
            .consolidate(&CandidateMemory::new("Launch is next week", MemoryCategory::Temporal, 0.6), "conversation")
            .await
            .unwrap();
        let record = f.store.get(outcome.record_id()).await.unwrap().unwrap();
        assert!(record.expires_at.is_none());
    }

    #[tokio::test]
    async fn explicit_expiry_is_kept_for_temporal() {
        let f = fixture().await;
        let c = consolidator(&f);
        let mut candidate = CandidateMemory::new("Dentist appointment Tuesday", MemoryCategory::Temporal, 0.5);
        let due = epoch() + chrono::Duration::days(2);
        candidate.expires_at = Some(due);

        let outcome = c.consolidate(&candidate, "conversation").await.unwrap();
        let record = f.store.get(outcome.record_id()).await.unwrap().unwrap();
        assert_eq!(record.expires_at, Some(due));
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let f = fixture().await;
        f.embedder.fail(true);
        let c = consolidator(&f);
        let err = c
            .consolidate(&CandidateMemory::new("anything", MemoryCategory::Factual, 0.5), "conversation")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(f.store.count(true).await.unwrap(), 0);
        assert_eq!(f.vectors.count("knowledge").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn document_entries_are_never_neighbors() {
        let f = fixture().await;
        f.embedder.set("User likes tea", [1.0, 0.0, 0.0, 0.0]);
        f.vectors
            .upsert(
                "knowledge",
                vec![keepsake_core::types::VectorPoint {
                    id: "doc-1".into(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    payload: serde_json::json!({"type": "document"}),
                }],
            )
            .await
            .unwrap();
        let c = consolidator(&f);
        let outcome = c
            .consolidate(&CandidateMemory::new("User likes tea", MemoryCategory::Preference, 0.5), "conversation")
            .await
            .unwrap();
        assert!(matches!(outcome, ConsolidationOutcome::Stored { .. }));
    }
}
