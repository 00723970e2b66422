// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic lifecycle maintenance: expire, decay, prune, purge history.

use std::sync::Arc;
use std::time::Duration;

use keepsake_config::model::MaintenanceConfig;
use keepsake_core::error::KeepsakeError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::index::MemoryIndex;
use crate::store::MemoryStore;
use crate::types::MaintenanceResult;

/// Tunables for one maintenance run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenanceParams {
    pub decay_factor: f64,
    pub min_importance: f64,
    pub stale_days: i64,
}

impl From<&MaintenanceConfig> for MaintenanceParams {
    fn from(config: &MaintenanceConfig) -> Self {
        Self {
            decay_factor: config.decay_factor,
            min_importance: config.min_importance,
            stale_days: config.stale_days,
        }
    }
}

pub struct MaintenanceJob {
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    history_retention_days: Option<i64>,
}

impl MaintenanceJob {
    pub fn new(
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        history_retention_days: Option<i64>,
    ) -> Self {
        Self {
            store,
            index,
            history_retention_days,
        }
    }

    /// Run every step in order. A failed step is recorded and the rest still run.
    pub async fn run(&self, params: MaintenanceParams) -> MaintenanceResult {
        let mut result = MaintenanceResult::default();

        match self.store.cleanup_expired_memories().await {
            Ok(ids) => result.expired = self.drop_vectors("expire", ids).await,
            Err(e) => record_failure(&mut result, "expire", e),
        }

        match self.store.decay_importance(params.decay_factor).await {
            Ok(n) => {
                metrics::counter!("keepsake_maintenance_rows_total", "step" => "decay")
                    .increment(n as u64);
                result.decayed = n;
            }
            Err(e) => record_failure(&mut result, "decay", e),
        }

        match self
            .store
            .prune_memories(params.min_importance, params.stale_days)
            .await
        {
            Ok(ids) => result.pruned = self.drop_vectors("prune", ids).await,
            Err(e) => record_failure(&mut result, "prune", e),
        }

        if let Some(days) = self.history_retention_days {
            match self.store.purge_superseded(days).await {
                Ok(ids) => result.purged_history = self.drop_vectors("purge", ids).await,
                Err(e) => record_failure(&mut result, "purge", e),
            }
        }

        info!(
            expired = result.expired,
            decayed = result.decayed,
            pruned = result.pruned,
            purged_history = result.purged_history,
            errors = result.errors.len(),
            "maintenance complete"
        );
        result
    }

    /// Remove vector entries for deleted records; returns the record count.
    async fn drop_vectors(&self, step: &'static str, ids: Vec<String>) -> usize {
        metrics::counter!("keepsake_maintenance_rows_total", "step" => step)
            .increment(ids.len() as u64);
        if let Err(e) = self.index.delete(&ids).await {
            warn!(step, error = %e, count = ids.len(), "failed to remove vector entries");
        }
        ids.len()
    }
}

fn record_failure(result: &mut MaintenanceResult, step: &str, error: KeepsakeError) {
    warn!(step, error = %error, "maintenance step failed");
    result.errors.push(format!("{step}: {error}"));
}

/// Run the job every `interval` until `cancel` fires. The first run happens
/// one full interval after spawning.
pub fn spawn_maintenance_loop(
    job: Arc<MaintenanceJob>,
    params: MaintenanceParams,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = job.run(params).await;
                    if !result.errors.is_empty() {
                        warn!(errors = ?result.errors, "maintenance finished with errors");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("maintenance loop shutting down");
                    break;
                }
            }
        }
    })
}
