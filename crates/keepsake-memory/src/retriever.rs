// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-time ranking of memories.
//!
//! Vector neighbors are re-ranked by a weighted blend of semantic
//! similarity, stored importance and recency, then rendered as a block that
//! can be placed ahead of a user prompt.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_core::error::KeepsakeError;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::index::MemoryIndex;
use crate::store::MemoryStore;
use crate::tracker::AccessTracker;
use crate::types::{FormattedContext, MemoryCategory, MemoryRecord, ScoredMemory};

const SEMANTIC_WEIGHT: f64 = 0.5;
const IMPORTANCE_WEIGHT: f64 = 0.25;
const RECENCY_WEIGHT: f64 = 0.25;

/// Recency reaches its floor after this many days.
const RECENCY_HORIZON_DAYS: f64 = 60.0;
const RECENCY_FLOOR: f64 = 0.5;

/// Neighbors fetched per requested result, to leave room for filtering.
const OVERFETCH: usize = 3;

pub const CONTEXT_HEADER: &str = "## Relevant Memories";

/// `max(0.5, 1 - age_days / 60)`, with future timestamps treated as age zero.
pub fn recency_factor(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - created_at).num_milliseconds().max(0) as f64) / 86_400_000.0;
    (1.0 - age_days / RECENCY_HORIZON_DAYS).max(RECENCY_FLOOR)
}

pub fn combined_score(semantic: f32, importance: f64, recency: f64) -> f64 {
    f64::from(semantic) * SEMANTIC_WEIGHT + importance * IMPORTANCE_WEIGHT + recency * RECENCY_WEIGHT
}

/// Descending score, then descending similarity, then ascending id.
fn rank_order(a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.semantic.partial_cmp(&a.semantic).unwrap_or(Ordering::Equal))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

/// Render ranked memories grouped by category, groups in order of their
/// best-ranked member.
pub fn format_context(memories: &[ScoredMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let mut groups: Vec<(MemoryCategory, Vec<&MemoryRecord>)> = Vec::new();
    for scored in memories {
        let category = scored.record.category;
        match groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, records)) => records.push(&scored.record),
            None => groups.push((category, vec![&scored.record])),
        }
    }

    let mut text = String::from(CONTEXT_HEADER);
    text.push('\n');
    for (category, records) in groups {
        for record in records {
            text.push_str(&format!("[{category}] {}\n", record.content));
        }
    }
    text
}

pub struct MemoryRetriever {
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    tracker: Arc<AccessTracker>,
    clock: Arc<dyn Clock>,
}

impl MemoryRetriever {
    pub fn new(
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        tracker: Arc<AccessTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            index,
            tracker,
            clock,
        }
    }

    /// Ranked live memories for a query, at most `limit` of them.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredMemory>, KeepsakeError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let embedding = self.index.embed(query).await?;
        let neighbors: HashMap<String, f32> = self
            .index
            .search(&embedding, limit.saturating_mul(OVERFETCH))
            .await?
            .into_iter()
            .filter(|m| m.score >= min_score)
            .map(|m| (m.id, m.score))
            .collect();
        if neighbors.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = neighbors.keys().cloned().collect();
        let now = self.clock.now();
        let mut scored: Vec<ScoredMemory> = self
            .store
            .get_many(&ids)
            .await?
            .into_iter()
            .filter(|r| !r.is_superseded() && !r.is_expired(now))
            .filter_map(|record| {
                let semantic = *neighbors.get(&record.id)?;
                let score = combined_score(
                    semantic,
                    record.importance,
                    recency_factor(record.created_at, now),
                );
                Some(ScoredMemory {
                    record,
                    semantic,
                    score,
                })
            })
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(limit);

        self.tracker
            .touch(scored.iter().map(|s| s.record.id.clone()).collect());
        debug!(
            neighbors = neighbors.len(),
            returned = scored.len(),
            "memories retrieved"
        );
        Ok(scored)
    }

    /// Like [`retrieve`](Self::retrieve), rendered; failures yield an empty context.
    pub async fn query(&self, query: &str, limit: usize, min_score: f32) -> FormattedContext {
        match self.retrieve(query, limit, min_score).await {
            Ok(memories) => FormattedContext {
                text: format_context(&memories),
                memories,
            },
            Err(e) => {
                warn!(error = %e, "memory retrieval failed; continuing without context");
                FormattedContext::default()
            }
        }
    }
}
