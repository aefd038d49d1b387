//! Worker registration and lifecycle
//!
//! A worker binds one processing function to one queue and runs a
//! long-lived consumption loop over the queue's delivery channel. The
//! loop claims one envelope at a time, invokes the processor, and
//! reports the outcome back to the channel; a failing (or panicking)
//! processor is recorded against that job alone and never stops the
//! loop.
//!
//! Lifecycle: `Running` until `close()` is called, then `Draining`
//! while the in-flight envelope finishes, then `Closed`. Closing a
//! worker never destroys its queue.

use crate::broker::JobChannel;
use crate::notifications::{EventBroadcaster, ManagerEvent};
use crate::queue::envelope::JobEnvelope;
use crate::queue::error::ProcessingError;
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Job-processing function attached to a queue.
///
/// One processor instance is shared by all of a worker's consumption
/// slots, so implementations must be safe to call concurrently.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Handle one claimed envelope. An error marks the job failed; what
    /// happens to the envelope next is the store's retry policy, not
    /// the worker's.
    async fn process(&self, envelope: &JobEnvelope) -> Result<(), ProcessingError>;

    /// Identifier used in logs
    fn name(&self) -> &str {
        "processor"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Number of envelopes this worker may process concurrently
    pub concurrency: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// A consumer bound to exactly one queue name and one processor
pub struct Worker {
    id: u64,
    queue_name: String,
    processor_name: String,
    state: RwLock<WorkerState>,
    drain_tx: watch::Sender<bool>,
    loops: Mutex<Option<Vec<JoinHandle<()>>>>,
    events: Arc<EventBroadcaster>,
}

impl Worker {
    pub(crate) fn spawn(
        id: u64,
        queue_name: String,
        channel: Arc<JobChannel>,
        processor: Arc<dyn Processor>,
        options: WorkerOptions,
        events: Arc<EventBroadcaster>,
    ) -> Arc<Self> {
        let (drain_tx, drain_rx) = watch::channel(false);

        let worker = Arc::new(Self {
            id,
            queue_name: queue_name.clone(),
            processor_name: processor.name().to_string(),
            state: RwLock::new(WorkerState::Running),
            drain_tx,
            loops: Mutex::new(None),
            events,
        });

        let concurrency = options.concurrency.max(1);
        let mut loops = Vec::with_capacity(concurrency);
        for slot in 0..concurrency {
            loops.push(tokio::spawn(consume_loop(
                Arc::clone(&channel),
                Arc::clone(&processor),
                drain_rx.clone(),
                id,
                slot,
                queue_name.clone(),
            )));
        }
        *worker.loops.lock().unwrap() = Some(loops);

        worker
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The queue this worker consumes
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap()
    }

    /// Stop claiming new work, let the in-flight envelope finish, and
    /// release the consumption loops.
    ///
    /// Idempotent: only the first call drains and emits events; calling
    /// close on an already closed worker is a no-op.
    pub async fn close(self: &Arc<Self>) {
        let Some(loops) = self.loops.lock().unwrap().take() else {
            return;
        };

        *self.state.write().unwrap() = WorkerState::Draining;
        log::debug!("worker {} on '{}' draining", self.id, self.queue_name);
        self.events
            .notify(&ManagerEvent::WorkerUpdated(Arc::clone(self)));

        let _ = self.drain_tx.send(true);
        futures::future::join_all(loops).await;

        *self.state.write().unwrap() = WorkerState::Closed;
        log::debug!("worker {} on '{}' closed", self.id, self.queue_name);
        self.events
            .notify(&ManagerEvent::WorkerRemoved(Arc::clone(self)));
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("queue_name", &self.queue_name)
            .field("state", &self.state())
            .finish()
    }
}

/// One consumption slot: claim, process, report, repeat.
async fn consume_loop(
    channel: Arc<JobChannel>,
    processor: Arc<dyn Processor>,
    mut drain_rx: watch::Receiver<bool>,
    worker_id: u64,
    slot: usize,
    queue_name: String,
) {
    loop {
        if *drain_rx.borrow() {
            break;
        }

        // Claiming is cancel-safe, so racing it against the drain signal
        // cannot lose an envelope; once claimed, the job is processed to
        // completion even if a drain arrives meanwhile.
        let claimed = tokio::select! {
            envelope = channel.claim() => envelope,
            changed = drain_rx.changed() => {
                if changed.is_err() {
                    // Drain sender gone: the worker handle was dropped
                    break;
                }
                continue;
            }
        };

        let Some(envelope) = claimed else {
            log::debug!(
                "worker {worker_id}/{slot}: channel for '{queue_name}' closed, stopping"
            );
            break;
        };

        log::trace!(
            "worker {worker_id}/{slot}: processing job {} from '{queue_name}'",
            envelope.id
        );

        let outcome = AssertUnwindSafe(processor.process(&envelope))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => channel.report_success(&envelope),
            Ok(Err(error)) => {
                log::warn!(
                    "worker {worker_id}/{slot}: job {} on '{queue_name}' failed: {error}",
                    envelope.id
                );
                channel.report_failure(envelope);
            }
            Err(_) => {
                log::error!(
                    "worker {worker_id}/{slot}: processor panicked on job {} from '{queue_name}'",
                    envelope.id
                );
                channel.report_failure(envelope);
            }
        }
    }
}
