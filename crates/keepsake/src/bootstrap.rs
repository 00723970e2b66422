// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process setup shared by every subcommand: tracing, config, wiring.

use std::path::Path;
use std::sync::Arc;

use keepsake_config::model::KeepsakeConfig;
use keepsake_core::KeepsakeError;
use keepsake_memory::MemoryService;
use keepsake_openai::{OpenAiEmbedder, OpenAiProvider};
use keepsake_storage::Database;
use tracing::debug;

/// Install the fmt subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keepsake={log_level},warn")));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load and validate configuration, rendering diagnostics on failure.
pub fn load_config(path: Option<&Path>) -> Option<KeepsakeConfig> {
    let result = match path {
        Some(path) => keepsake_config::load_and_validate_path(path),
        None => keepsake_config::load_and_validate(),
    };
    match result {
        Ok(config) => Some(config),
        Err(errors) => {
            keepsake_config::render_errors(&errors);
            None
        }
    }
}

/// Everything a subcommand needs to talk to memory.
pub struct Runtime {
    pub db: Database,
    pub service: MemoryService,
    pub provider: Arc<OpenAiProvider>,
    pub embedder: Arc<OpenAiEmbedder>,
}

/// Open the database and wire the memory service to the HTTP adapters.
pub async fn open_runtime(config: &KeepsakeConfig) -> Result<Runtime, KeepsakeError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let provider = Arc::new(OpenAiProvider::new(&config.llm)?);
    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let service = MemoryService::new(&db, provider.clone(), embedder.clone(), config);
    debug!(database = %config.storage.database_path, "memory service ready");
    Ok(Runtime {
        db,
        service,
        provider,
        embedder,
    })
}
