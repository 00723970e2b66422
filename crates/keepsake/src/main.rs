// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keepsake - long-term conversational memory.
//!
//! Binary entry point: the stdin daemon plus management subcommands.

mod bootstrap;
mod commands;
mod daemon;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keepsake_memory::{ListFilter, MaintenanceParams, MemoryCategory};

use crate::commands::Output;

/// Keepsake - long-term conversational memory.
#[derive(Parser, Debug)]
#[command(name = "keepsake", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the memory daemon (JSON lines on stdin).
    Run,
    /// Show memories relevant to a query.
    Query {
        text: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Store a fact immediately.
    Remember {
        text: String,
        #[arg(long, value_parser = parse_category)]
        category: Option<MemoryCategory>,
        #[arg(long)]
        importance: Option<f64>,
    },
    /// List stored memories, newest first.
    List {
        #[arg(long, value_parser = parse_category)]
        category: Option<MemoryCategory>,
        /// Include superseded records.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one memory in full.
    Show { id: String },
    /// Delete a memory.
    Forget { id: String },
    /// Run maintenance once (expire, decay, prune).
    Maintain {
        #[arg(long)]
        decay_factor: Option<f64>,
        #[arg(long)]
        min_importance: Option<f64>,
        #[arg(long)]
        stale_days: Option<i64>,
    },
    /// Show record counts and adapter health.
    Status,
    /// Manage Keepsake configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate the configuration and exit.
    Check,
}

fn parse_category(value: &str) -> Result<MemoryCategory, String> {
    MemoryCategory::ALL
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| {
            let valid: Vec<&str> = MemoryCategory::ALL.iter().map(|c| c.as_str()).collect();
            format!("expected one of: {}", valid.join(", "))
        })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(config) = bootstrap::load_config(cli.config.as_deref()) else {
        std::process::exit(1);
    };
    bootstrap::init_tracing(&config.logging.level);
    let out = Output::new(cli.json, cli.plain);

    let result = match cli.command {
        Some(Commands::Run) => daemon::run_daemon(&config).await,
        Some(Commands::Query {
            text,
            limit,
            min_score,
        }) => commands::run_query(&config, &text, limit, min_score, out).await,
        Some(Commands::Remember {
            text,
            category,
            importance,
        }) => commands::run_remember(&config, &text, category, importance, out).await,
        Some(Commands::List {
            category,
            all,
            limit,
            offset,
        }) => {
            let filter = ListFilter {
                category,
                include_superseded: all,
                limit: Some(limit),
                offset,
            };
            commands::run_list(&config, filter, out).await
        }
        Some(Commands::Show { id }) => commands::run_show(&config, &id, out).await,
        Some(Commands::Forget { id }) => commands::run_forget(&config, &id, out).await,
        Some(Commands::Maintain {
            decay_factor,
            min_importance,
            stale_days,
        }) => {
            let defaults = MaintenanceParams::from(&config.maintenance);
            let params = MaintenanceParams {
                decay_factor: decay_factor.unwrap_or(defaults.decay_factor),
                min_importance: min_importance.unwrap_or(defaults.min_importance),
                stale_days: stale_days.unwrap_or(defaults.stale_days),
            };
            commands::run_maintain(&config, params, out).await
        }
        Some(Commands::Status) => commands::run_status(&config, out).await,
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => {
            println!("keepsake: configuration OK");
            Ok(())
        }
        None => {
            println!("keepsake: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("keepsake: {e}");
        std::process::exit(1);
    }
}
