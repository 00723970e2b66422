// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background `last_accessed` updates for retrieved records.
//!
//! Retrieval hands ids to a channel and returns immediately; a single worker
//! task applies the updates. Failures are logged and dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::MemoryStore;

const QUEUE_DEPTH: usize = 256;

enum Message {
    Touch(Vec<String>),
    Barrier(oneshot::Sender<()>),
}

/// Handle to the access-tracking worker.
pub struct AccessTracker {
    tx: mpsc::Sender<Message>,
    worker: JoinHandle<()>,
}

impl AccessTracker {
    /// Spawn the worker on the current runtime.
    pub fn spawn(store: Arc<MemoryStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Message>(QUEUE_DEPTH);
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Touch(ids) => match store.track_access(&ids).await {
                        Ok(updated) => debug!(requested = ids.len(), updated, "access tracked"),
                        Err(e) => warn!(error = %e, "failed to track memory access"),
                    },
                    Message::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("access tracker stopped");
        });
        Self { tx, worker }
    }

    /// Queue an access update. Never blocks; a full queue drops the update.
    pub fn touch(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.tx.try_send(Message::Touch(ids)) {
            warn!(error = %e, "access tracker queue unavailable; update dropped");
        }
    }

    /// Wait until every update queued before this call has been applied.
    pub async fn settle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Barrier(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl Drop for AccessTracker {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
