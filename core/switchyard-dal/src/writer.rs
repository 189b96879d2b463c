//! Serialized writer: a FIFO queue drained by a single worker task.
//!
//! Positional spreadsheet writes (append at the computed end, delete by row
//! index) are only correct if nothing else moves rows underneath them. Every
//! operation submitted here runs alone, in submission order, and its outcome
//! goes back to its own caller only. A failing or panicking operation does not
//! stop the queue.

use crate::error::{DalError, DalResult};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Whether the worker is currently executing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Running,
}

/// Handle to the writer queue. Clones share one queue and one worker.
#[derive(Clone)]
pub struct SerializedWriter {
    jobs: mpsc::UnboundedSender<Job>,
    outstanding: Arc<AtomicUsize>,
}

impl SerializedWriter {
    /// Spawns the worker. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let outstanding = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&outstanding);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }
            debug!("serialized writer stopped");
        });

        Self { jobs, outstanding }
    }

    /// Queues `op` and waits for its outcome.
    pub async fn submit<F, Fut, T>(&self, label: &str, op: F) -> DalResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DalResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let name = label.to_string();
        let job: Job = Box::new(move || {
            async move {
                debug!(op = %name, "running serialized operation");
                let outcome = match AssertUnwindSafe(async move { op().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(op = %name, "serialized operation panicked");
                        Err(DalError::ExternalService(format!("operation {name} panicked")))
                    }
                };
                if let Err(e) = &outcome {
                    debug!(op = %name, error = %e, "serialized operation failed");
                }
                // The caller may have stopped waiting.
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.jobs.send(job).is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(DalError::ExternalService(
                "serialized writer is not running".to_string(),
            ));
        }

        rx.await.map_err(|_| {
            DalError::ExternalService(format!("operation {label} was dropped before completing"))
        })?
    }

    pub fn state(&self) -> WriterState {
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            WriterState::Idle
        } else {
            WriterState::Running
        }
    }

    /// Operations waiting behind the one currently running.
    pub fn queued(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst).saturating_sub(1)
    }
}

impl Default for SerializedWriter {
    fn default() -> Self {
        Self::new()
    }
}
