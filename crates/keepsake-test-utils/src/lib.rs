// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keepsake integration tests.
//!
//! Provides mock adapters and a harness for fast, deterministic tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock LLM provider with scripted responses
//! - [`MockEmbedder`] - Deterministic embedder with pinnable vectors
//! - [`TestHarness`] - A full `MemoryService` over a temp database

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use harness::{harness_epoch, record, TestHarness, TestHarnessBuilder};
pub use mock_embedder::{hashed_embedding, MockEmbedder, MOCK_DIMENSIONS};
pub use mock_provider::{MockProvider, EMPTY_EXTRACTION};
