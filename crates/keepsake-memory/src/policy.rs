// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Near-duplicate policy: a similarity threshold plus an equivalence judge.

use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{CandidateMemory, MemoryRecord};

/// How a candidate relates to a highly similar existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Same fact; keep the existing record.
    Equivalent,
    /// Same subject, different detail; the candidate replaces the record.
    Contradicts,
    /// Unrelated despite the similarity.
    Distinct,
}

pub trait EquivalenceJudge: Send + Sync + 'static {
    fn judge(&self, candidate: &CandidateMemory, existing: &MemoryRecord) -> Verdict;
}

/// Words that carry no identity for a fact.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "i", "in", "is",
    "it", "its", "me", "my", "of", "on", "or", "s", "so", "that", "the", "their", "they", "this",
    "to", "user", "users", "was", "were", "will", "with",
];

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Words that turn a restatement into a change of the fact.
const CHANGE_MARKERS: &[&str] = &[
    "anymore", "but", "except", "instead", "less", "longer", "more", "never", "no", "none", "not",
    "now", "nothing", "quit", "rather", "stopped", "t", "than", "unless",
];

/// Token-set judge.
///
/// Equivalent when the candidate's tokens are a subset of the existing
/// record's and neither side has a change marker the other lacks. Anything
/// else is Contradicts within a category and Distinct across categories, so
/// a candidate with extra detail replaces the record. Stopword-only text is
/// never Equivalent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalJudge;

impl EquivalenceJudge for LexicalJudge {
    fn judge(&self, candidate: &CandidateMemory, existing: &MemoryRecord) -> Verdict {
        let new_tokens = tokens(&candidate.content);
        let old_tokens = tokens(&existing.content);
        // Nothing to compare on.
        if new_tokens.is_empty() || old_tokens.is_empty() {
            return Verdict::Distinct;
        }
        let changes_meaning = new_tokens
            .symmetric_difference(&old_tokens)
            .any(|t| CHANGE_MARKERS.contains(&t.as_str()));
        if new_tokens.is_subset(&old_tokens) && !changes_meaning {
            Verdict::Equivalent
        } else if candidate.category != existing.category {
            Verdict::Distinct
        } else {
            Verdict::Contradicts
        }
    }
}

/// Threshold and judge used by the consolidator.
#[derive(Clone)]
pub struct DuplicatePolicy {
    threshold: f32,
    judge: Arc<dyn EquivalenceJudge>,
}

impl DuplicatePolicy {
    pub fn new(threshold: f32, judge: Arc<dyn EquivalenceJudge>) -> Self {
        Self { threshold, judge }
    }

    /// Lexical judging at the given threshold.
    pub fn lexical(threshold: f32) -> Self {
        Self::new(threshold, Arc::new(LexicalJudge))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True when a neighbor is close enough to need judging.
    pub fn is_near(&self, similarity: f32) -> bool {
        similarity >= self.threshold
    }

    pub fn judge(&self, candidate: &CandidateMemory, existing: &MemoryRecord) -> Verdict {
        self.judge.judge(candidate, existing)
    }
}

impl std::fmt::Debug for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicatePolicy")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryCategory;

    fn record(content: &str, category: MemoryCategory) -> MemoryRecord {
        let now = chrono::Utc::now();
        MemoryRecord {
            id: "existing".into(),
            content: content.into(),
            category,
            importance: 0.5,
            source_type: "conversation".into(),
            created_at: now,
            last_accessed: now,
            expires_at: None,
            superseded_by: None,
        }
    }

    #[test]
    fn rephrasing_is_equivalent() {
        let candidate = CandidateMemory::new("User prefers dark mode", MemoryCategory::Preference, 0.6);
        let existing = record("The user prefers dark mode", MemoryCategory::Preference);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Equivalent);
    }

    #[test]
    fn less_detailed_restatement_is_equivalent() {
        let candidate = CandidateMemory::new("User prefers dark mode", MemoryCategory::Preference, 0.6);
        let existing = record("The user prefers dark mode in every editor", MemoryCategory::Preference);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Equivalent);
    }

    #[test]
    fn added_detail_replaces_the_record() {
        let candidate = CandidateMemory::new(
            "The user prefers dark mode in every editor",
            MemoryCategory::Preference,
            0.6,
        );
        let existing = record("User prefers dark mode", MemoryCategory::Preference);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Contradicts);
    }

    #[test]
    fn negation_contradicts() {
        let existing = record("User likes coffee", MemoryCategory::Preference);
        for content in [
            "User no longer likes coffee",
            "User likes coffee less than tea now",
            "User doesn't like coffee anymore",
        ] {
            let candidate = CandidateMemory::new(content, MemoryCategory::Preference, 0.6);
            assert_eq!(
                LexicalJudge.judge(&candidate, &existing),
                Verdict::Contradicts,
                "{content}"
            );
        }

        let candidate = CandidateMemory::new("Project deadline is not Monday", MemoryCategory::Temporal, 0.7);
        let existing = record("Project deadline is Monday", MemoryCategory::Temporal);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Contradicts);
    }

    #[test]
    fn dropping_a_negation_contradicts() {
        let candidate = CandidateMemory::new("User likes coffee", MemoryCategory::Preference, 0.6);
        let existing = record("User does not like coffee", MemoryCategory::Preference);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Contradicts);

        let existing = record("User never drinks coffee", MemoryCategory::Preference);
        let candidate = CandidateMemory::new("User drinks coffee", MemoryCategory::Preference, 0.6);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Contradicts);
    }

    #[test]
    fn stopword_only_candidate_is_never_equivalent() {
        let candidate = CandidateMemory::new("It is to be", MemoryCategory::Preference, 0.5);
        let existing = record("User prefers dark mode", MemoryCategory::Preference);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Distinct);

        let candidate = CandidateMemory::new("the user", MemoryCategory::Factual, 0.5);
        let existing = record("The user", MemoryCategory::Factual);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Distinct);
    }

    #[test]
    fn changed_detail_contradicts() {
        let candidate = CandidateMemory::new("Project deadline is Friday", MemoryCategory::Temporal, 0.7);
        let existing = record("Project deadline is Monday", MemoryCategory::Temporal);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Contradicts);
    }

    #[test]
    fn different_category_is_distinct() {
        let candidate = CandidateMemory::new(
            "User's sister Ana works at the bakery",
            MemoryCategory::Relationship,
            0.5,
        );
        let existing = record("User works at the hospital", MemoryCategory::Factual);
        assert_eq!(LexicalJudge.judge(&candidate, &existing), Verdict::Distinct);
    }

    #[test]
    fn threshold_is_inclusive() {
        let policy = DuplicatePolicy::lexical(0.9);
        assert!(policy.is_near(0.9));
        assert!(policy.is_near(0.95));
        assert!(!policy.is_near(0.89));
        assert_eq!(policy.threshold(), 0.9);
    }
}
