// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed store for memory records and their lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_core::error::KeepsakeError;
use keepsake_storage::{map_tr_err, Database};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::clock::Clock;
use crate::types::{format_timestamp, parse_timestamp, MemoryCategory, MemoryRecord};

/// Records untouched for this long are eligible for decay.
pub const DECAY_AFTER_DAYS: i64 = 7;

/// Importance never decays below this.
pub const DECAY_FLOOR: f64 = 0.05;

/// Records at or below this importance are no longer decayed.
pub const DECAY_MIN_IMPORTANCE: f64 = 0.1;

const SELECT_COLUMNS: &str = "SELECT id, content, category, importance, source_type, \
     created_at, last_accessed, expires_at, superseded_by FROM memories";

/// Filter and paging for [`MemoryStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<MemoryCategory>,
    pub include_superseded: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Persistent store for memory records.
pub struct MemoryStore {
    conn: Connection,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates a store on an already migrated database.
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: db.connection().clone(),
            clock,
        }
    }

    fn now(&self) -> String {
        format_timestamp(&self.clock.now())
    }

    /// Cutoff `days` before now; out-of-range counts are a validation error.
    fn days_ago(&self, days: i64) -> Result<String, KeepsakeError> {
        chrono::Duration::try_days(days)
            .and_then(|span| self.clock.now().checked_sub_signed(span))
            .map(|cutoff| format_timestamp(&cutoff))
            .ok_or_else(|| {
                KeepsakeError::Validation(format!("{days} days is outside the supported date range"))
            })
    }

    pub async fn insert(&self, record: &MemoryRecord) -> Result<(), KeepsakeError> {
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memories (id, content, category, importance, source_type, \
                     created_at, last_accessed, expires_at, superseded_by) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        record.id,
                        record.content,
                        record.category.as_str(),
                        record.importance.clamp(0.0, 1.0),
                        record.source_type,
                        format_timestamp(&record.created_at),
                        format_timestamp(&record.last_accessed),
                        record.expires_at.as_ref().map(format_timestamp),
                        record.superseded_by,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, KeepsakeError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<MemoryRecord>, rusqlite::Error> {
                conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    params![id],
                    row_to_record,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetch records by id, superseded ones included. Missing ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, KeepsakeError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
                let sql = format!("{SELECT_COLUMNS} WHERE id IN ({})", placeholders.join(", "));
                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<&dyn rusqlite::types::ToSql> =
                    ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
                let records = stmt
                    .query_map(params.as_slice(), row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Newest first.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<MemoryRecord>, KeepsakeError> {
        let category = filter.category.map(|c| c.as_str().to_string());
        let include_superseded = filter.include_superseded;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset as i64;
        self.conn
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE (?1 IS NULL OR category = ?1) \
                     AND (?2 OR superseded_by IS NULL) \
                     ORDER BY created_at DESC, id ASC LIMIT ?3 OFFSET ?4"
                ))?;
                let records = stmt
                    .query_map(
                        params![category, include_superseded, limit, offset],
                        row_to_record,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn count(&self, include_superseded: bool) -> Result<usize, KeepsakeError> {
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE (?1 OR superseded_by IS NULL)",
                    params![include_superseded],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Hard-delete one record. Returns false if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool, KeepsakeError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                Ok(conn.execute("DELETE FROM memories WHERE id = ?1", params![id])? > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Raise importance (capped at 1.0) and refresh last_accessed.
    ///
    /// Returns false when the record is missing or superseded.
    pub async fn boost(&self, id: &str, amount: f64) -> Result<bool, KeepsakeError> {
        let id = id.to_string();
        let now = self.now();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let changed = conn.execute(
                    "UPDATE memories SET importance = MIN(1.0, MAX(0.0, importance + ?1)), \
                     last_accessed = ?2 WHERE id = ?3 AND superseded_by IS NULL",
                    params![amount, now, id],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Mark `old_id` as replaced by `new_id`.
    ///
    /// Returns false when `old_id` is missing or already superseded.
    pub async fn supersede(&self, old_id: &str, new_id: &str) -> Result<bool, KeepsakeError> {
        let old_id = old_id.to_string();
        let new_id = new_id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let changed = conn.execute(
                    "UPDATE memories SET superseded_by = ?1 \
                     WHERE id = ?2 AND superseded_by IS NULL",
                    params![new_id, old_id],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Refresh last_accessed for retrieved records. Returns rows touched.
    pub async fn track_access(&self, ids: &[String]) -> Result<usize, KeepsakeError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let now = self.now();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut touched = 0;
                {
                    let mut stmt =
                        tx.prepare("UPDATE memories SET last_accessed = ?1 WHERE id = ?2")?;
                    for id in &ids {
                        touched += stmt.execute(params![now, id])?;
                    }
                }
                tx.commit()?;
                Ok(touched)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Multiply importance by `factor` for live records idle over a week.
    ///
    /// Only records above 0.1 decay, and never below 0.05.
    pub async fn decay_importance(&self, factor: f64) -> Result<usize, KeepsakeError> {
        let cutoff = self.days_ago(DECAY_AFTER_DAYS)?;
        let factor = factor.clamp(0.0, 1.0);
        let decayed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET importance = MAX(?1, importance * ?2) \
                     WHERE superseded_by IS NULL AND last_accessed < ?3 AND importance > ?4",
                    params![DECAY_FLOOR, factor, cutoff, DECAY_MIN_IMPORTANCE],
                )
            })
            .await
            .map_err(map_tr_err)?;
        debug!(decayed, factor, "importance decayed");
        Ok(decayed)
    }

    /// Hard-delete live records below `min_importance` and idle for `stale_days`.
    ///
    /// Returns the deleted ids.
    pub async fn prune_memories(
        &self,
        min_importance: f64,
        stale_days: i64,
    ) -> Result<Vec<String>, KeepsakeError> {
        let cutoff = self.days_ago(stale_days)?;
        self.delete_where(
            "superseded_by IS NULL AND importance < ?1 AND last_accessed < ?2",
            vec![Value::Real(min_importance), Value::Text(cutoff)],
        )
        .await
    }

    /// Hard-delete live temporal records whose expiry has passed.
    pub async fn cleanup_expired_memories(&self) -> Result<Vec<String>, KeepsakeError> {
        let now = self.now();
        self.delete_where(
            "superseded_by IS NULL AND category = 'temporal' \
             AND expires_at IS NOT NULL AND expires_at <= ?1",
            vec![Value::Text(now)],
        )
        .await
    }

    /// Hard-delete superseded records whose successor was created more than
    /// `retention_days` ago, or no longer exists.
    pub async fn purge_superseded(&self, retention_days: i64) -> Result<Vec<String>, KeepsakeError> {
        let cutoff = self.days_ago(retention_days)?;
        self.delete_where(
            "superseded_by IS NOT NULL AND COALESCE(\
             (SELECT n.created_at FROM memories n WHERE n.id = memories.superseded_by), '') < ?1",
            vec![Value::Text(cutoff)],
        )
        .await
    }

    async fn delete_where(
        &self,
        predicate: &'static str,
        args: Vec<Value>,
    ) -> Result<Vec<String>, KeepsakeError> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let ids: Vec<String> = {
                    let mut stmt =
                        tx.prepare(&format!("SELECT id FROM memories WHERE {predicate}"))?;
                    stmt.query_map(params_from_iter(args.iter()), |row| row.get(0))?
                        .collect::<Result<_, _>>()?
                };
                {
                    let mut stmt = tx.prepare("DELETE FROM memories WHERE id = ?1")?;
                    for id in &ids {
                        stmt.execute(params![id])?;
                    }
                }
                tx.commit()?;
                Ok(ids)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

/// Convert a rusqlite Row to a MemoryRecord.
fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    let category: String = row.get(2)?;
    let expires_at = match row.get::<_, Option<String>>(7)? {
        Some(_) => Some(timestamp_column(row, 7)?),
        None => None,
    };
    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        category: MemoryCategory::from_str_value(&category),
        importance: row.get(3)?,
        source_type: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        last_accessed: timestamp_column(row, 6)?,
        expires_at,
        superseded_by: row.get(8)?,
    })
}
