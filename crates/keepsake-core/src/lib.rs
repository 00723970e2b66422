// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Keepsake.
//!
//! Holds the error type, the adapter traits for external collaborators
//! (LLM provider, embeddings, vector index), and the types that cross those
//! trait boundaries.

pub mod error;
pub mod traits;
pub mod types;

pub use error::KeepsakeError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter, VectorIndexAdapter};
