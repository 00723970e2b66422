// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory holding area for turns that have not been extracted yet.

use tokio::sync::Mutex;

use crate::types::BufferedTurn;

#[derive(Debug, Default)]
pub struct MessageBuffer {
    turns: Mutex<Vec<BufferedTurn>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, turn: BufferedTurn) {
        self.turns.lock().await.push(turn);
    }

    /// Removes and returns every buffered turn in arrival order.
    pub async fn take(&self) -> Vec<BufferedTurn> {
        std::mem::take(&mut *self.turns.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.lock().await.is_empty()
    }
}
