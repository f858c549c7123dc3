//! Supervised set of fire-and-forget background tasks.
//!
//! Cache refills and backlog reloads are scheduled as detached tasks whose
//! completion order is unspecified. Keeping their handles in one place lets
//! shutdown (and tests) wait for everything in flight instead of silently
//! dropping work.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Cloneable handle to the shared task set.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a detached task and keep its handle.
    ///
    /// Finished handles are reaped on each spawn so the set stays small in
    /// long-running processes.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        if let Ok(mut handles) = self.inner.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    /// Wait until every scheduled task (including tasks they spawn in turn)
    /// has completed.
    pub async fn wait_idle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = match self.inner.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(error) = handle.await {
                    if !error.is_cancelled() {
                        tracing::warn!(%error, "background task failed");
                    }
                }
            }
        }
    }
}
