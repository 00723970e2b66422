// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `./keepsake.toml` > `~/.config/keepsake/keepsake.toml` >
//! `/etc/keepsake/keepsake.toml`, with `KEEPSAKE_*` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeepsakeConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/keepsake/keepsake.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "keepsake.toml";

/// Sections that `KEEPSAKE_<SECTION>_<KEY>` variables are routed into.
const ENV_SECTIONS: &[&str] = &[
    "logging",
    "storage",
    "llm",
    "embedding",
    "memory",
    "maintenance",
];

/// Returns the per-user config path, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keepsake").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keepsake/keepsake.toml`
/// 3. `~/.config/keepsake/keepsake.toml`
/// 4. `./keepsake.toml`
/// 5. `KEEPSAKE_*` environment variables
pub fn load_config() -> Result<KeepsakeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string, without env overrides.
pub fn load_config_from_str(toml_content: &str) -> Result<KeepsakeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeepsakeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used by [`load_config`] without extracting it.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(KeepsakeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment.merge(Toml::file(LOCAL_CONFIG_FILE)).merge(env_provider())
}

/// Environment provider that routes the first `_` after a known section to a dot.
///
/// `Env::split("_")` would turn `KEEPSAKE_MEMORY_IDLE_TIMEOUT_SECS` into
/// `memory.idle.timeout.secs`; the explicit map keeps it `memory.idle_timeout_secs`.
fn env_provider() -> Env {
    Env::prefixed("KEEPSAKE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
