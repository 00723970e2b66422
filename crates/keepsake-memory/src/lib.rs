// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term conversational memory.
//!
//! Turns are buffered and, once the conversation goes idle, an LLM extracts
//! durable facts from them. Each fact is consolidated against its nearest
//! existing memory (stored, skipped as a duplicate, or superseding an older
//! version) and persisted to SQLite plus a shared vector collection. Queries
//! rank memories by similarity, importance and recency. A maintenance job
//! expires, decays and prunes records over time.
//!
//! ## Architecture
//!
//! - **ExtractionScheduler**: debounce timer and single-flight cycle lock
//! - **MemoryExtractor**: transcript to candidate facts (`LlmExtractor`)
//! - **Consolidator**: store / skip / supersede against the nearest neighbor
//! - **MemoryStore**: SQLite persistence and lifecycle queries
//! - **MemoryIndex**: `type = "memory"` view over the vector collection
//! - **MemoryRetriever**: blended ranking and context rendering
//! - **MaintenanceJob**: expire, decay, prune and optional history purge
//! - **MemoryService**: the public surface

pub mod buffer;
pub mod clock;
pub mod consolidator;
pub mod extractor;
pub mod index;
pub mod maintenance;
pub mod pipeline;
pub mod policy;
pub mod retriever;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use consolidator::Consolidator;
pub use extractor::{LlmExtractor, MemoryExtractor};
pub use index::MemoryIndex;
pub use maintenance::{spawn_maintenance_loop, MaintenanceJob, MaintenanceParams};
pub use policy::{DuplicatePolicy, EquivalenceJudge, LexicalJudge, Verdict};
pub use retriever::MemoryRetriever;
pub use scheduler::{ExtractionScheduler, FlushHandler};
pub use service::{MemoryService, ServiceParts};
pub use store::{ListFilter, MemoryStore};
pub use tracker::AccessTracker;
pub use types::*;
