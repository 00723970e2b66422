// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector index.
//!
//! Vectors live in the `vector_points` table as little-endian f32 blobs next
//! to a JSON payload. Search is an exact cosine scan over one collection,
//! optionally narrowed by a `json_extract` equality filter.

use async_trait::async_trait;
use rusqlite::params;
use tracing::debug;

use keepsake_core::types::{PayloadFilter, VectorMatch, VectorPoint};
use keepsake_core::{AdapterType, HealthStatus, KeepsakeError, PluginAdapter, VectorIndexAdapter};

use crate::database::{map_tr_err, Database};

/// Serialize an f32 vector to a little-endian byte blob.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deserialize a little-endian byte blob back to an f32 vector.
///
/// Trailing bytes that do not form a full f32 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Vector index stored alongside the memory records.
pub struct SqliteVectorIndex {
    db: Database,
}

impl SqliteVectorIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of points in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize, KeepsakeError> {
        let collection = collection.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM vector_points WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite-vector"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        self.db.ping().await?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl VectorIndexAdapter for SqliteVectorIndex {
    async fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), KeepsakeError> {
        if points.is_empty() {
            return Ok(());
        }
        let collection = collection.to_string();
        let rows: Vec<(String, Vec<u8>, String)> = points
            .into_iter()
            .map(|p| (p.id, vec_to_blob(&p.vector), p.payload.to_string()))
            .collect();
        let n = rows.len();

        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO vector_points (collection, id, vector, payload) \
                         VALUES (?1, ?2, ?3, ?4) \
                         ON CONFLICT(collection, id) DO UPDATE SET \
                         vector = excluded.vector, payload = excluded.payload",
                    )?;
                    for (id, blob, payload) in &rows {
                        stmt.execute(params![collection, id, blob, payload])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)?;

        debug!(points = n, "vector points upserted");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<VectorMatch>, KeepsakeError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let collection = collection.to_string();
        let query = vector.to_vec();
        let filter = filter.cloned();

        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<(String, Vec<u8>, String)>, rusqlite::Error> {
                let mut out = Vec::new();
                match filter {
                    Some(filter) => {
                        let path = format!("$.\"{}\"", filter.key.replace('"', ""));
                        let mut stmt = conn.prepare(
                            "SELECT id, vector, payload FROM vector_points \
                             WHERE collection = ?1 AND json_extract(payload, ?2) = ?3",
                        )?;
                        let mapped = stmt.query_map(params![collection, path, filter.value], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                        })?;
                        for row in mapped {
                            out.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, vector, payload FROM vector_points WHERE collection = ?1",
                        )?;
                        let mapped = stmt.query_map(params![collection], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                        })?;
                        for row in mapped {
                            out.push(row?);
                        }
                    }
                }
                Ok(out)
            })
            .await
            .map_err(map_tr_err)?;

        let mut matches: Vec<VectorMatch> = rows
            .into_iter()
            .filter_map(|(id, blob, payload)| {
                let stored = blob_to_vec(&blob);
                if stored.len() != query.len() {
                    debug!(id = %id, "skipping vector with mismatched dimensions");
                    return None;
                }
                let payload = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
                Some(VectorMatch {
                    score: cosine_similarity(&query, &stored),
                    id,
                    payload,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<(), KeepsakeError> {
        if ids.is_empty() {
            return Ok(());
        }
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx
                        .prepare("DELETE FROM vector_points WHERE collection = ?1 AND id = ?2")?;
                    for id in &ids {
                        stmt.execute(params![collection, id])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn make_index() -> (SqliteVectorIndex, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("vec.db").to_str().unwrap(), true)
            .await
            .unwrap();
        (SqliteVectorIndex::new(db), dir)
    }

    fn point(id: &str, vector: Vec<f32>, kind: &str) -> VectorPoint {
        VectorPoint {
            id: id.to_string(),
            vector,
            payload: json!({"type": kind}),
        }
    }

    #[test]
    fn blob_round_trip_preserves_values() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let (index, _dir) = make_index().await;
        index
            .upsert(
                "knowledge",
                vec![
                    point("far", vec![0.0, 1.0], "memory"),
                    point("near", vec![1.0, 0.1], "memory"),
                    point("exact", vec![1.0, 0.0], "memory"),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("knowledge", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert_eq!(hits[1].id, "near");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn filter_excludes_other_payload_types() {
        let (index, _dir) = make_index().await;
        index
            .upsert(
                "knowledge",
                vec![
                    point("doc-chunk", vec![1.0, 0.0], "document"),
                    point("mem", vec![0.9, 0.1], "memory"),
                ],
            )
            .await
            .unwrap();

        let filter = PayloadFilter::new("type", "memory");
        let hits = index
            .search("knowledge", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mem");
        assert_eq!(hits[0].payload["type"], "memory");
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let (index, _dir) = make_index().await;
        index
            .upsert("c", vec![point("a", vec![1.0, 0.0], "memory")])
            .await
            .unwrap();
        index
            .upsert("c", vec![point("a", vec![0.0, 1.0], "memory")])
            .await
            .unwrap();
        assert_eq!(index.count("c").await.unwrap(), 1);

        let hits = index.search("c", &[0.0, 1.0], 1, None).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        index
            .delete("c", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(index.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let (index, _dir) = make_index().await;
        index
            .upsert("one", vec![point("a", vec![1.0], "memory")])
            .await
            .unwrap();
        let hits = index.search("two", &[1.0], 5, None).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(
            index.health_check().await.unwrap(),
            HealthStatus::Healthy
        );
    }
}
