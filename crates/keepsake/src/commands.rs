// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot management subcommands.

use std::io::IsTerminal;

use colored::Colorize;
use keepsake_config::model::KeepsakeConfig;
use keepsake_core::{HealthStatus, KeepsakeError, PluginAdapter};
use keepsake_memory::{
    format_timestamp, ConsolidationOutcome, ListFilter, MaintenanceParams, MemoryCategory,
    MemoryRecord,
};
use serde::Serialize;

use crate::bootstrap::open_runtime;

/// Output switches shared by the management commands.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub color: bool,
}

impl Output {
    pub fn new(json: bool, plain: bool) -> Self {
        Self {
            json,
            color: !plain && !json && std::io::stdout().is_terminal(),
        }
    }
}

/// JSON view of a record.
#[derive(Debug, Serialize)]
pub struct RecordView<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub category: &'a str,
    pub importance: f64,
    pub source_type: &'a str,
    pub created_at: String,
    pub last_accessed: String,
    pub expires_at: Option<String>,
    pub superseded_by: Option<&'a str>,
}

impl<'a> From<&'a MemoryRecord> for RecordView<'a> {
    fn from(record: &'a MemoryRecord) -> Self {
        Self {
            id: &record.id,
            content: &record.content,
            category: record.category.as_str(),
            importance: record.importance,
            source_type: &record.source_type,
            created_at: format_timestamp(&record.created_at),
            last_accessed: format_timestamp(&record.last_accessed),
            expires_at: record.expires_at.as_ref().map(format_timestamp),
            superseded_by: record.superseded_by.as_deref(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, KeepsakeError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| KeepsakeError::Internal(format!("failed to serialize output: {e}")))
}

/// One-line summary used by `list`.
pub fn summary_line(record: &MemoryRecord, color: bool) -> String {
    let short_id: String = record.id.chars().take(8).collect();
    let marker = if record.is_superseded() { " (superseded)" } else { "" };
    if color {
        format!(
            "{}  {:<12} {:.2}  {}{}",
            short_id.dimmed(),
            format!("[{}]", record.category).cyan(),
            record.importance,
            record.content,
            marker.yellow()
        )
    } else {
        format!(
            "{short_id}  {:<12} {:.2}  {}{marker}",
            format!("[{}]", record.category),
            record.importance,
            record.content
        )
    }
}

pub async fn run_query(
    config: &KeepsakeConfig,
    query: &str,
    limit: Option<usize>,
    min_score: Option<f32>,
    out: Output,
) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let context = runtime
        .service
        .query_memories(
            query,
            limit.unwrap_or(config.memory.retrieval_limit),
            min_score.unwrap_or(config.memory.min_score),
        )
        .await;

    if out.json {
        #[derive(Serialize)]
        struct Hit<'a> {
            score: f64,
            semantic: f32,
            #[serde(flatten)]
            record: RecordView<'a>,
        }
        let hits: Vec<Hit<'_>> = context
            .memories
            .iter()
            .map(|m| Hit {
                score: m.score,
                semantic: m.semantic,
                record: RecordView::from(&m.record),
            })
            .collect();
        println!("{}", to_json(&hits)?);
    } else if context.is_empty() {
        println!("No relevant memories.");
    } else {
        print!("{}", context.text);
    }
    runtime.service.shutdown().await;
    Ok(())
}

pub async fn run_remember(
    config: &KeepsakeConfig,
    content: &str,
    category: Option<MemoryCategory>,
    importance: Option<f64>,
    out: Output,
) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let outcome = runtime
        .service
        .remember(content, category, importance)
        .await?;
    let (action, message) = match &outcome {
        ConsolidationOutcome::Stored { id } => ("stored", format!("Stored {id}")),
        ConsolidationOutcome::Skipped { existing_id } => {
            ("skipped", format!("Already known as {existing_id}; importance raised"))
        }
        ConsolidationOutcome::Superseded { old_id, new_id } => {
            ("superseded", format!("Stored {new_id}, replacing {old_id}"))
        }
    };
    if out.json {
        println!(
            "{}",
            to_json(&serde_json::json!({ "action": action, "id": outcome.record_id() }))?
        );
    } else if out.color {
        println!("{} {message}", "✓".green());
    } else {
        println!("{message}");
    }
    Ok(())
}

pub async fn run_list(
    config: &KeepsakeConfig,
    filter: ListFilter,
    out: Output,
) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let records = runtime.service.list_memories(&filter).await?;
    if out.json {
        let views: Vec<RecordView<'_>> = records.iter().map(RecordView::from).collect();
        println!("{}", to_json(&views)?);
    } else if records.is_empty() {
        println!("No memories.");
    } else {
        for record in &records {
            println!("{}", summary_line(record, out.color));
        }
    }
    Ok(())
}

pub async fn run_show(config: &KeepsakeConfig, id: &str, out: Output) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let Some(record) = runtime.service.get_memory(id).await? else {
        return Err(KeepsakeError::Validation(format!("no memory with id {id}")));
    };
    let view = RecordView::from(&record);
    if out.json {
        println!("{}", to_json(&view)?);
        return Ok(());
    }
    println!("id:            {}", view.id);
    println!("content:       {}", view.content);
    println!("category:      {}", view.category);
    println!("importance:    {:.3}", view.importance);
    println!("source:        {}", view.source_type);
    println!("created:       {}", view.created_at);
    println!("last accessed: {}", view.last_accessed);
    if let Some(expires) = &view.expires_at {
        println!("expires:       {expires}");
    }
    if let Some(successor) = view.superseded_by {
        println!("superseded by: {successor}");
    }
    Ok(())
}

pub async fn run_forget(config: &KeepsakeConfig, id: &str, out: Output) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let deleted = runtime.service.delete_memory(id).await?;
    if out.json {
        println!("{}", to_json(&serde_json::json!({ "id": id, "deleted": deleted }))?);
    } else if deleted {
        println!("Forgot {id}");
    } else {
        println!("No memory with id {id}");
    }
    Ok(())
}

pub async fn run_maintain(
    config: &KeepsakeConfig,
    params: MaintenanceParams,
    out: Output,
) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let result = runtime
        .service
        .run_maintenance(params.decay_factor, params.min_importance, params.stale_days)
        .await;
    if out.json {
        println!("{}", to_json(&result)?);
    } else {
        println!("expired:        {}", result.expired);
        println!("decayed:        {}", result.decayed);
        println!("pruned:         {}", result.pruned);
        println!("purged history: {}", result.purged_history);
        for error in &result.errors {
            if out.color {
                println!("{} {error}", "✗".red());
            } else {
                println!("error: {error}");
            }
        }
    }
    if result.errors.is_empty() {
        Ok(())
    } else {
        Err(KeepsakeError::Internal(format!(
            "{} maintenance step(s) failed",
            result.errors.len()
        )))
    }
}

fn health_label(status: &HealthStatus, color: bool) -> String {
    match (status, color) {
        (HealthStatus::Healthy, true) => "healthy".green().to_string(),
        (HealthStatus::Healthy, false) => "healthy".to_string(),
        (other, true) => format!("{other:?}").red().to_string(),
        (other, false) => format!("{other:?}"),
    }
}

pub async fn run_status(config: &KeepsakeConfig, out: Output) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let live = runtime.service.count(false).await?;
    let total = runtime.service.count(true).await?;
    let database = match runtime.db.ping().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    let llm = runtime.provider.health_check().await?;
    let embedding = runtime.embedder.health_check().await?;

    if out.json {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "database": runtime.db.path(),
                "memories": live,
                "superseded": total - live,
                "health": {
                    "database": format!("{database:?}"),
                    "llm": format!("{llm:?}"),
                    "embedding": format!("{embedding:?}"),
                },
            }))?
        );
        return Ok(());
    }
    println!("database:   {}", runtime.db.path());
    println!("memories:   {live} live, {} superseded", total - live);
    println!("db health:  {}", health_label(&database, out.color));
    println!("llm:        {} ({})", health_label(&llm, out.color), config.llm.base_url);
    println!(
        "embeddings: {} ({})",
        health_label(&embedding, out.color),
        config.embedding.base_url
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> MemoryRecord {
        let at = chrono::Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap();
        MemoryRecord {
            id: "0f3c2a91-6b7e-4d7a-9d44-5d1a3e9c7b20".into(),
            content: "User prefers dark mode".into(),
            category: MemoryCategory::Preference,
            importance: 0.6,
            source_type: "conversation".into(),
            created_at: at,
            last_accessed: at,
            expires_at: None,
            superseded_by: None,
        }
    }

    #[test]
    fn plain_summary_line() {
        assert_eq!(
            summary_line(&sample(), false),
            "0f3c2a91  [preference] 0.60  User prefers dark mode"
        );
        let mut old = sample();
        old.superseded_by = Some("next".into());
        assert!(summary_line(&old, false).ends_with("(superseded)"));
    }

    #[test]
    fn record_view_formats_timestamps() {
        let record = sample();
        let view = RecordView::from(&record);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["created_at"], "2026-05-01T08:30:00.000Z");
        assert_eq!(json["category"], "preference");
        assert!(json["expires_at"].is_null());
    }
}
