// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every violation instead of failing on the first one.

use crate::diagnostic::ConfigError;
use crate::model::KeepsakeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for every day-count setting (about a century).
pub const MAX_DAYS: i64 = 36_500;

/// Upper bound for the maintenance interval (one year).
pub const MAX_INTERVAL_HOURS: u64 = 8_760;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &KeepsakeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        fail(format!(
            "logging.level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.logging.level
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    for (name, url) in [
        ("llm.base_url", &config.llm.base_url),
        ("embedding.base_url", &config.embedding.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            fail(format!("{name} must start with http:// or https://, got `{url}`"));
        }
    }

    if config.llm.timeout_secs == 0 {
        fail("llm.timeout_secs must be greater than 0".to_string());
    }
    if config.embedding.timeout_secs == 0 {
        fail("embedding.timeout_secs must be greater than 0".to_string());
    }

    let memory = &config.memory;
    if memory.idle_timeout_secs == 0 {
        fail("memory.idle_timeout_secs must be greater than 0".to_string());
    }
    if memory.extraction_timeout_secs == 0 {
        fail("memory.extraction_timeout_secs must be greater than 0".to_string());
    }
    if !(0.0..=1.0).contains(&memory.duplicate_threshold) {
        fail(format!(
            "memory.duplicate_threshold must be within 0.0-1.0, got {}",
            memory.duplicate_threshold
        ));
    }
    if !(0.0..=1.0).contains(&memory.min_score) {
        fail(format!(
            "memory.min_score must be within 0.0-1.0, got {}",
            memory.min_score
        ));
    }
    if memory.collection.trim().is_empty() {
        fail("memory.collection must not be empty".to_string());
    }
    if memory.retrieval_limit == 0 {
        fail("memory.retrieval_limit must be at least 1".to_string());
    }
    if !(1..=MAX_DAYS).contains(&memory.temporal_ttl_days) {
        fail(format!(
            "memory.temporal_ttl_days must be within 1-{MAX_DAYS}, got {}",
            memory.temporal_ttl_days
        ));
    }

    let maintenance = &config.maintenance;
    if !(1..=MAX_INTERVAL_HOURS).contains(&maintenance.interval_hours) {
        fail(format!(
            "maintenance.interval_hours must be within 1-{MAX_INTERVAL_HOURS}, got {}",
            maintenance.interval_hours
        ));
    }
    if !(maintenance.decay_factor > 0.0 && maintenance.decay_factor <= 1.0) {
        fail(format!(
            "maintenance.decay_factor must be within (0.0, 1.0], got {}",
            maintenance.decay_factor
        ));
    }
    if !(0.0..=1.0).contains(&maintenance.min_importance) {
        fail(format!(
            "maintenance.min_importance must be within 0.0-1.0, got {}",
            maintenance.min_importance
        ));
    }
    if !(1..=MAX_DAYS).contains(&maintenance.stale_days) {
        fail(format!(
            "maintenance.stale_days must be within 1-{MAX_DAYS}, got {}",
            maintenance.stale_days
        ));
    }
    if let Some(days) = maintenance.history_retention_days
        && !(1..=MAX_DAYS).contains(&days)
    {
        fail(format!(
            "maintenance.history_retention_days must be within 1-{MAX_DAYS} when set, got {days}"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
