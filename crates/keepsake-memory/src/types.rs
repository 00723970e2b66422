// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in SQLite and vector payloads. Sorts lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Importance given to candidates that omit it or send a non-finite value.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Format a timestamp for storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored or LLM-supplied timestamp.
///
/// Accepts RFC 3339, the storage layout, a naive `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC) and a bare `YYYY-MM-DD` (end of that day, UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}

/// Clamp an importance into [0, 1]; missing or non-finite values become 0.5.
pub fn clamp_importance(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => DEFAULT_IMPORTANCE,
    }
}

/// What kind of fact a memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Factual,
    Preference,
    Relationship,
    /// Time-bound facts; these always carry an expiry.
    Temporal,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 4] = [
        MemoryCategory::Factual,
        MemoryCategory::Preference,
        MemoryCategory::Relationship,
        MemoryCategory::Temporal,
    ];

    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Factual => "factual",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Relationship => "relationship",
            MemoryCategory::Temporal => "temporal",
        }
    }

    /// Parse leniently. Anything unrecognised is `Factual`.
    pub fn from_str_value(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "preference" => MemoryCategory::Preference,
            "relationship" => MemoryCategory::Relationship,
            "temporal" => MemoryCategory::Temporal,
            _ => MemoryCategory::Factual,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub category: MemoryCategory,
    /// Always within [0, 1].
    pub importance: f64,
    /// Where the memory came from, e.g. "conversation" or "explicit".
    pub source_type: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Id of the record that replaced this one.
    pub superseded_by: Option<String>,
}

impl MemoryRecord {
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Speaker of a buffered turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Transcript label.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// An unprocessed conversation turn held by the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedTurn {
    pub role: Role,
    pub content: String,
    /// Conversation or channel the turn came from.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// A normalized fact proposed by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMemory {
    pub content: String,
    pub category: MemoryCategory,
    pub importance: f64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CandidateMemory {
    pub fn new(content: impl Into<String>, category: MemoryCategory, importance: f64) -> Self {
        Self {
            content: content.into(),
            category,
            importance: clamp_importance(Some(importance)),
            expires_at: None,
        }
    }
}

/// A record with its retrieval scores.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    /// Cosine similarity from the vector index.
    pub semantic: f32,
    /// Weighted blend of similarity, importance and recency.
    pub score: f64,
}

/// Retrieval output ready to splice into a prompt.
#[derive(Debug, Clone, Default)]
pub struct FormattedContext {
    /// Rendered `## Relevant Memories` block, empty when nothing matched.
    pub text: String,
    pub memories: Vec<ScoredMemory>,
}

impl FormattedContext {
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

/// What the consolidator did with one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    Stored { id: String },
    Skipped { existing_id: String },
    Superseded { old_id: String, new_id: String },
}

impl ConsolidationOutcome {
    /// Id of the record that now represents the candidate.
    pub fn record_id(&self) -> &str {
        match self {
            ConsolidationOutcome::Stored { id } => id,
            ConsolidationOutcome::Skipped { existing_id } => existing_id,
            ConsolidationOutcome::Superseded { new_id, .. } => new_id,
        }
    }
}

/// Summary of one extraction and consolidation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub turns: usize,
    pub candidates: usize,
    pub stored: usize,
    pub skipped: usize,
    pub superseded: usize,
    pub failed: usize,
}

/// Per-step counts from a maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceResult {
    pub expired: usize,
    pub decayed: usize,
    pub pruned: usize,
    pub purged_history: usize,
    /// One message per failed step.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn category_parse_is_lenient() {
        assert_eq!(MemoryCategory::from_str_value("Preference"), MemoryCategory::Preference);
        assert_eq!(MemoryCategory::from_str_value(" temporal "), MemoryCategory::Temporal);
        assert_eq!(MemoryCategory::from_str_value("hobby"), MemoryCategory::Factual);
        assert_eq!(MemoryCategory::from_str_value(""), MemoryCategory::Factual);
        for category in MemoryCategory::ALL {
            assert_eq!(MemoryCategory::from_str_value(category.as_str()), category);
        }
    }

    #[test]
    fn importance_clamping() {
        assert_eq!(clamp_importance(Some(1.7)), 1.0);
        assert_eq!(clamp_importance(Some(-0.2)), 0.0);
        assert_eq!(clamp_importance(Some(0.42)), 0.42);
        assert_eq!(clamp_importance(Some(f64::NAN)), DEFAULT_IMPORTANCE);
        assert_eq!(clamp_importance(Some(f64::INFINITY)), DEFAULT_IMPORTANCE);
        assert_eq!(clamp_importance(None), DEFAULT_IMPORTANCE);
    }

    #[test]
    fn timestamp_formats() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let stored = format_timestamp(&ts);
        assert_eq!(stored, "2026-03-01T12:30:00.000Z");
        assert_eq!(parse_timestamp(&stored), Some(ts));
        assert_eq!(parse_timestamp("2026-03-01T12:30:00+00:00"), Some(ts));
        assert_eq!(parse_timestamp("2026-03-01T12:30:00"), Some(ts));
        assert_eq!(
            parse_timestamp("2026-03-01"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap())
        );
        assert_eq!(parse_timestamp("next friday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn stored_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn expiry_check() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut record = MemoryRecord {
            id: "m".into(),
            content: "deadline".into(),
            category: MemoryCategory::Temporal,
            importance: 0.5,
            source_type: "conversation".into(),
            created_at: now,
            last_accessed: now,
            expires_at: Some(now - chrono::Duration::hours(1)),
            superseded_by: None,
        };
        assert!(record.is_expired(now));
        record.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(!record.is_expired(now));
        record.expires_at = None;
        assert!(!record.is_expired(now));
    }
}
