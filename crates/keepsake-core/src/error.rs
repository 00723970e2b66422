// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every Keepsake crate.

use thiserror::Error;

/// The primary error type used across adapter traits and the memory subsystem.
///
/// Variants fall into three families:
/// - transient I/O (`Storage`, `Provider`, `Embedding`, `VectorIndex`, `Timeout`),
/// - `Validation` for malformed input that callers normalize instead of propagating,
/// - `Consistency` for records that changed between a read and a dependent write.
#[derive(Debug, Error)]
pub enum KeepsakeError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Structured store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (HTTP failure, bad status, unparseable body).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding backend errors.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Vector index errors.
    #[error("vector index error: {message}")]
    VectorIndex {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Malformed data from a collaborator (LLM output, payloads).
    #[error("validation error: {0}")]
    Validation(String),

    /// A record changed or vanished between a read and a dependent write.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeepsakeError {
    /// Returns true for I/O failures against an external collaborator.
    ///
    /// The memory layer never retries these; it degrades to "no effect".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KeepsakeError::Storage { .. }
                | KeepsakeError::Provider { .. }
                | KeepsakeError::Embedding { .. }
                | KeepsakeError::VectorIndex { .. }
                | KeepsakeError::Timeout { .. }
        )
    }
}
