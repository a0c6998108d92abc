//! Work queue and dispatcher.
//!
//! Many producers, one consumer: message handlers enqueue and return
//! immediately, a single background task serializes the expensive model and
//! external-process work. A failed item is logged and never blocks the next
//! one.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dejavu_core::WorkItem;

use crate::pipeline::Pipeline;

/// Cheap cloneable handle used by message handlers to enqueue work.
#[derive(Clone)]
pub struct SubmitHandle {
    tx: Option<mpsc::UnboundedSender<WorkItem>>,
}

impl SubmitHandle {
    /// Enqueue an item, fire-and-forget. A no-op when the pipeline is
    /// disabled or already shut down.
    pub fn submit(&self, item: WorkItem) {
        let Some(tx) = &self.tx else {
            debug!("pipeline disabled, dropping {:?}", item.post);
            return;
        };
        if tx.send(item).is_err() {
            warn!("pipeline worker stopped, dropping submission");
        }
    }

    /// Whether submissions currently go anywhere.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// Owns the worker task and the submitting side of the queue.
pub struct Dispatcher {
    handle: SubmitHandle,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the single consumer over a pipeline.
    pub fn spawn(pipeline: Arc<Pipeline>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkItem>();

        let worker = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if let Err(e) = pipeline.process(&item).await {
                    // One bad item must not poison the loop.
                    error!("processing {:?} failed: {}", item.post, e);
                }
            }
            debug!("media pipeline worker drained and stopped");
        });

        info!("media pipeline worker started");
        Self {
            handle: SubmitHandle { tx: Some(tx) },
            worker: Some(worker),
        }
    }

    /// A dispatcher whose submissions are no-ops, for when the model failed
    /// to load at startup. Logged once here.
    pub fn disabled() -> Self {
        warn!("media pipeline disabled: model unavailable");
        Self {
            handle: SubmitHandle { tx: None },
            worker: None,
        }
    }

    /// Handle for producers.
    pub fn handle(&self) -> SubmitHandle {
        self.handle.clone()
    }

    /// Close the queue and wait for the worker to drain what it holds.
    /// Producers must have dropped their handles for the queue to close.
    /// An in-flight item at process shutdown may be abandoned by the caller
    /// simply not awaiting this.
    pub async fn shutdown(mut self) {
        self.handle.tx = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("pipeline worker join failed: {}", e);
            }
        }
    }
}
