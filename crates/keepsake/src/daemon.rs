// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keepsake run`: a line-oriented memory daemon.
//!
//! Reads one JSON request per line on stdin and writes one JSON reply per
//! line on stdout for requests that produce output. Turns are buffered and
//! extracted after the configured idle timeout; maintenance runs on its own
//! interval. EOF, SIGINT or SIGTERM flush the buffer before exit.

use keepsake_config::model::KeepsakeConfig;
use keepsake_core::KeepsakeError;
use keepsake_memory::{FlushReport, MemoryCategory, MemoryService, Role};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::bootstrap::open_runtime;
use crate::shutdown::install_signal_handler;

fn default_source() -> String {
    "stdin".to_string()
}

/// One line of daemon input.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    Turn {
        role: Role,
        content: String,
        #[serde(default = "default_source")]
        source: String,
    },
    Query {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        min_score: Option<f32>,
    },
    Remember {
        content: String,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        importance: Option<f64>,
    },
    Flush,
}

pub fn parse_request(line: &str) -> Result<DaemonRequest, serde_json::Error> {
    serde_json::from_str(line)
}

fn flush_reply(report: &FlushReport) -> serde_json::Value {
    json!({
        "type": "flush",
        "turns": report.turns,
        "candidates": report.candidates,
        "stored": report.stored,
        "skipped": report.skipped,
        "superseded": report.superseded,
        "failed": report.failed,
    })
}

/// Handle one request; `None` means nothing to print.
async fn dispatch(
    service: &MemoryService,
    config: &KeepsakeConfig,
    request: DaemonRequest,
) -> Option<serde_json::Value> {
    match request {
        DaemonRequest::Turn {
            role,
            content,
            source,
        } => {
            service.submit_turn(role, &content, &source).await;
            None
        }
        DaemonRequest::Query {
            query,
            limit,
            min_score,
        } => {
            let context = service
                .query_memories(
                    &query,
                    limit.unwrap_or(config.memory.retrieval_limit),
                    min_score.unwrap_or(config.memory.min_score),
                )
                .await;
            let ids: Vec<&str> = context
                .memories
                .iter()
                .map(|m| m.record.id.as_str())
                .collect();
            Some(json!({ "type": "context", "text": context.text, "ids": ids }))
        }
        DaemonRequest::Remember {
            content,
            category,
            importance,
        } => {
            let category = category.as_deref().map(MemoryCategory::from_str_value);
            match service.remember(&content, category, importance).await {
                Ok(outcome) => Some(json!({
                    "type": "remembered",
                    "id": outcome.record_id(),
                })),
                Err(e) => Some(error_reply(&e.to_string())),
            }
        }
        DaemonRequest::Flush => Some(flush_reply(&service.force_flush().await)),
    }
}

fn error_reply(message: &str) -> serde_json::Value {
    json!({ "type": "error", "message": message })
}

async fn write_line(
    stdout: &mut tokio::io::Stdout,
    value: &serde_json::Value,
) -> Result<(), KeepsakeError> {
    let mut line = value.to_string();
    line.push('\n');
    stdout
        .write_all(line.as_bytes())
        .await
        .map_err(|e| KeepsakeError::Internal(format!("failed to write to stdout: {e}")))?;
    stdout
        .flush()
        .await
        .map_err(|e| KeepsakeError::Internal(format!("failed to flush stdout: {e}")))
}

pub async fn run_daemon(config: &KeepsakeConfig) -> Result<(), KeepsakeError> {
    let runtime = open_runtime(config).await?;
    let service = &runtime.service;
    let cancel = install_signal_handler();
    let maintenance = service.spawn_maintenance(cancel.child_token());

    info!(
        idle_timeout_secs = config.memory.idle_timeout_secs,
        database = %config.storage.database_path,
        "keepsake daemon started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match parse_request(&line) {
                    Ok(request) => dispatch(service, config, request).await,
                    Err(e) => {
                        warn!(error = %e, "ignoring malformed request");
                        Some(error_reply(&format!("malformed request: {e}")))
                    }
                };
                if let Some(reply) = reply {
                    write_line(&mut stdout, &reply).await?;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    let report = service.shutdown().await;
    if let Some(handle) = maintenance
        && let Err(e) = handle.await
    {
        warn!(error = %e, "maintenance task ended abnormally");
    }
    if let Err(e) = runtime.db.checkpoint().await {
        warn!(error = %e, "final WAL checkpoint failed");
    }
    info!(flushed_turns = report.turns, "keepsake daemon stopped");
    Ok(())
}
