// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced, single-flight extraction scheduling.
//!
//! Every submitted turn restarts one idle timer. When the timer fires, a
//! cycle takes the whole buffer and hands it to a [`FlushHandler`]. At most
//! one cycle runs at a time; turns that arrive meanwhile wait for the next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::buffer::MessageBuffer;
use crate::types::{BufferedTurn, FlushReport};

/// Consumer of taken buffer contents.
#[async_trait]
pub trait FlushHandler: Send + Sync + 'static {
    async fn handle(&self, turns: Vec<BufferedTurn>) -> FlushReport;
}

/// Owns the buffer, the debounce timer and the single-flight lock.
pub struct ExtractionScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: MessageBuffer,
    handler: Arc<dyn FlushHandler>,
    idle: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    cycle: tokio::sync::Mutex<()>,
    processing: AtomicBool,
}

/// Clears the processing flag even if the handler panics.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ExtractionScheduler {
    pub fn new(handler: Arc<dyn FlushHandler>, idle: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: MessageBuffer::new(),
                handler,
                idle,
                timer: Mutex::new(None),
                cycle: tokio::sync::Mutex::new(()),
                processing: AtomicBool::new(false),
            }),
        }
    }

    /// Buffers a turn and restarts the idle timer.
    pub async fn submit_turn(&self, turn: BufferedTurn) {
        self.inner.buffer.push(turn).await;
        Inner::arm_timer(&self.inner);
    }

    /// Processes whatever is buffered now, after any in-flight cycle finishes.
    pub async fn force_flush(&self) -> FlushReport {
        self.inner.cancel_timer();
        let _cycle = self.inner.cycle.lock().await;
        self.inner.process().await
    }

    /// Drops the pending timer without processing.
    pub fn cancel(&self) {
        self.inner.cancel_timer();
    }

    /// True while a cycle is inside the handler.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    pub async fn pending_turns(&self) -> usize {
        self.inner.buffer.len().await
    }
}

impl Drop for ExtractionScheduler {
    fn drop(&mut self) {
        self.inner.cancel_timer();
    }
}

impl Inner {
    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm_timer(this: &Arc<Self>) {
        let inner = Arc::clone(this);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.idle).await;
            // Detached so that re-arming the timer cannot cancel a running cycle.
            tokio::spawn(Inner::run_cycle(inner));
        });
        if let Some(previous) = this.lock_timer().replace(handle) {
            previous.abort();
        }
    }

    /// Re-arms only when no timer is pending.
    fn rearm_if_idle(this: &Arc<Self>) {
        let pending = this
            .lock_timer()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !pending {
            Inner::arm_timer(this);
        }
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
    }

    async fn run_cycle(this: Arc<Self>) {
        {
            let Ok(_cycle) = this.cycle.try_lock() else {
                debug!("extraction cycle already running; turns wait for the next one");
                return;
            };
            this.process().await;
        }

        if !this.buffer.is_empty().await {
            debug!("turns arrived during the cycle; re-arming timer");
            Inner::rearm_if_idle(&this);
        }
    }

    /// Callers must hold the cycle lock.
    async fn process(&self) -> FlushReport {
        let _processing = ProcessingGuard::set(&self.processing);
        let turns = self.buffer.take().await;
        if turns.is_empty() {
            return FlushReport::default();
        }
        debug!(turns = turns.len(), "running extraction cycle");
        self.handler.handle(turns).await
    }
}
