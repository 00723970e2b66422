// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One extraction cycle: transcript, candidates, consolidation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::consolidator::Consolidator;
use crate::extractor::{build_transcript, MemoryExtractor};
use crate::scheduler::FlushHandler;
use crate::types::{BufferedTurn, ConsolidationOutcome, FlushReport};

/// Source type used when a batch mixes turns from several sources.
pub const MIXED_SOURCE: &str = "conversation";

/// Flush handler that turns buffered conversation into memory records.
pub struct MemoryPipeline {
    extractor: Arc<dyn MemoryExtractor>,
    consolidator: Arc<Consolidator>,
}

impl MemoryPipeline {
    pub fn new(extractor: Arc<dyn MemoryExtractor>, consolidator: Arc<Consolidator>) -> Self {
        Self {
            extractor,
            consolidator,
        }
    }
}

fn batch_source(turns: &[BufferedTurn]) -> &str {
    match turns.split_first() {
        Some((first, rest)) if rest.iter().all(|t| t.source == first.source) => &first.source,
        _ => MIXED_SOURCE,
    }
}

#[async_trait]
impl FlushHandler for MemoryPipeline {
    async fn handle(&self, turns: Vec<BufferedTurn>) -> FlushReport {
        let mut report = FlushReport {
            turns: turns.len(),
            ..FlushReport::default()
        };
        let transcript = build_transcript(&turns);
        if transcript.is_empty() {
            return report;
        }

        let candidates = self.extractor.extract(&transcript).await;
        report.candidates = candidates.len();
        let source = batch_source(&turns);

        for candidate in &candidates {
            match self.consolidator.consolidate(candidate, source).await {
                Ok(ConsolidationOutcome::Stored { .. }) => report.stored += 1,
                Ok(ConsolidationOutcome::Skipped { .. }) => report.skipped += 1,
                Ok(ConsolidationOutcome::Superseded { .. }) => report.superseded += 1,
                Err(e) => {
                    warn!(error = %e, content = %candidate.content, "failed to consolidate candidate");
                    report.failed += 1;
                }
            }
        }

        if report.candidates > 0 {
            info!(
                turns = report.turns,
                stored = report.stored,
                skipped = report.skipped,
                superseded = report.superseded,
                failed = report.failed,
                "memory cycle complete"
            );
        } else {
            debug!(turns = report.turns, "memory cycle found nothing to keep");
        }
        report
    }
}
