// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Background Task Executor
//!
//! Fire-and-forget work dispatched from request handlers (e.g. sending the
//! welcome email). A task's error or panic is logged and goes no further:
//! the caller never sees its outcome and the process keeps running.
//!
//! Every dispatched task is counted until it finishes, and [`drain`]
//! resolves once the count reaches zero. The shutdown path waits on it.
//!
//! [`drain`]: BackgroundTasks::drain

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error};

#[derive(Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

/// Handle to the executor. Cheap to clone; all clones share one counter.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

/// Decrements the pending count when dropped, so the count is released on
/// every exit path of the supervising task.
struct PendingGuard(Arc<Inner>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `task` and return immediately.
    ///
    /// `name` only labels the log lines emitted if the task fails.
    pub fn run<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.inner.clone());

        // The inner task isolates panics: they surface as a JoinError here
        // instead of unwinding through the supervisor.
        tokio::spawn(async move {
            let _guard = guard;
            match tokio::spawn(task).await {
                Ok(Ok(())) => debug!(task = name, "Background task finished"),
                Ok(Err(e)) => error!(task = name, error = %e, "Background task failed"),
                Err(join_error) if join_error.is_panic() => {
                    let payload = join_error.into_panic();
                    error!(task = name, panic = %panic_message(&*payload), "Background task panicked");
                }
                Err(_) => error!(task = name, "Background task was cancelled"),
            }
        });
    }

    /// Number of dispatched tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until every dispatched task has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between the check and
            // the await is not lost.
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
