//! Supervised best-effort side tasks.
//!
//! Work spawned here is detached from the caller and may be lost if the
//! process exits: it is at-most-once. Failures and panics are logged instead
//! of disappearing.

use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` in the background, logging its outcome under `name`.
    pub fn spawn<F>(&self, name: &'static str, work: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let inner = self.tracker.spawn(work);
        self.tracker.spawn(async move {
            match inner.await {
                Ok(Ok(())) => debug!(task = name, "background task finished"),
                Ok(Err(e)) => warn!(task = name, error = %format!("{e:#}"), "background task failed"),
                Err(e) => warn!(task = name, error = %e, "background task panicked"),
            }
        });
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every task spawned so far. New spawns are still accepted.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
