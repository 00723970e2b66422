// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for external collaborators.
//!
//! All adapters extend [`PluginAdapter`] and use `#[async_trait]` for
//! dynamic dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod provider;
pub mod vector;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use provider::ProviderAdapter;
pub use vector::VectorIndexAdapter;
