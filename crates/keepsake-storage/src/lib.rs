// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Keepsake.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and a cosine-scan vector index that
//! shares the same database file.

pub mod database;
pub mod migrations;
pub mod vector;

pub use database::{map_tr_err, Database};
pub use vector::SqliteVectorIndex;
