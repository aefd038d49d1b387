//! QueueManager - central coordination for named job queues
//!
//! The QueueManager owns the shared broker connection, the registry of
//! named queues, the set of active workers, and the event broadcaster
//! that mirrors every structural change to subscribers.
//!
//! There is one manager per process: an explicit context object
//! constructed at startup and passed by reference to every collaborator.
//!
//! # Thread Safety
//!
//! The manager is fully thread-safe behind `Arc<QueueManager>`. Registry
//! mutation is serialized, so the create-or-get path is atomic with
//! respect to concurrent create calls for the same name.
//!
//! # Example
//!
//! ```rust,no_run
//! use jobq::core::config::ConnectionSettings;
//! use jobq::queue::{JobOptions, QueueManager};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = QueueManager::new(ConnectionSettings::from_env()?)?;
//!
//! manager.create_queue("email")?;
//! manager
//!     .add_job("email", json!({ "to": "a@b.com" }), JobOptions::default())
//!     .await?;
//!
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

use crate::broker::Connection;
use crate::core::config::ConnectionSettings;
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::notifications::{EventBroadcaster, EventKind, Listener, ManagerEvent, SubscriptionId};
use crate::queue::envelope::{JobEnvelope, JobOptions};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::queue::Queue;
use crate::queue::shared::SharedQueue;
use crate::queue::worker::{Processor, Worker, WorkerOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use strum::IntoEnumIterator;

/// Central manager for queues, workers and their lifecycle events
pub struct QueueManager {
    connection: Connection,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    workers: Mutex<Vec<Arc<Worker>>>,
    events: Arc<EventBroadcaster>,
    next_worker_id: AtomicU64,
    closed: AtomicBool,
    clock: Arc<dyn TimeProvider>,
}

impl QueueManager {
    /// Construct the manager: open the shared connection eagerly and
    /// create every predefined queue, in declaration order.
    ///
    /// Configuration problems (no broker host) fail here, before any
    /// queue exists.
    pub fn new(settings: ConnectionSettings) -> QueueResult<Arc<Self>> {
        Self::with_clock(settings, Arc::new(SystemTimeProvider))
    }

    pub(crate) fn with_clock(
        settings: ConnectionSettings,
        clock: Arc<dyn TimeProvider>,
    ) -> QueueResult<Arc<Self>> {
        let connection = Connection::open(settings)?;
        log::info!("queue manager connected to {}", connection.endpoint());

        let manager = Arc::new(Self {
            connection,
            queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            events: Arc::new(EventBroadcaster::new()),
            next_worker_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            clock,
        });

        for shared in SharedQueue::iter() {
            manager.create_queue(shared.queue_name())?;
        }

        Ok(manager)
    }

    /// Create a queue, or return the existing handle when the name is
    /// already registered.
    ///
    /// Creation emits `QueueCreated` once the registry reflects the new
    /// queue, so a subscriber observing the event can immediately look
    /// it up. The idempotent path emits nothing.
    pub fn create_queue(&self, name: &str) -> QueueResult<Arc<Queue>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::ManagerClosed);
        }

        // Check-and-insert under one lock: two racing callers for the
        // same name get the same handle and a single event.
        let (queue, created) = {
            let mut queues = self.queues.lock().unwrap();
            match queues.get(name) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let channel = self.connection.channel(name);
                    let queue = Arc::new(Queue::new(name.to_string(), channel));
                    queues.insert(name.to_string(), Arc::clone(&queue));
                    (queue, true)
                }
            }
        };

        if created {
            log::debug!("queue '{name}' created");
            self.events
                .notify(&ManagerEvent::QueueCreated(Arc::clone(&queue)));
        }

        Ok(queue)
    }

    /// Look up a queue by name. No side effects.
    pub fn get_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.lock().unwrap().get(name).cloned()
    }

    /// Snapshot of all registered queues; order is not significant.
    pub fn get_all_queues(&self) -> Vec<Arc<Queue>> {
        self.queues.lock().unwrap().values().cloned().collect()
    }

    /// Remove a queue: delete the registry entry and release the
    /// underlying channel, emitting `QueueRemoved`.
    ///
    /// Removing a name that is not registered is a no-op.
    pub fn remove_queue(&self, name: &str) -> QueueResult<()> {
        let removed = { self.queues.lock().unwrap().remove(name) };

        match removed {
            Some(queue) => {
                self.connection.release(name);
                log::debug!("queue '{name}' removed");
                self.events.notify(&ManagerEvent::QueueRemoved(queue));
            }
            None => log::debug!("remove_queue: '{name}' is not registered, nothing to do"),
        }

        Ok(())
    }

    /// Submit a job to a named queue, optionally delayed.
    ///
    /// The payload is wrapped in an envelope stamped with the submission
    /// time; the call resolves once the store has accepted the envelope.
    /// Fails with `QueueNotFound` when the queue does not exist and
    /// `Submission` when the store rejects the envelope.
    pub async fn add_job(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::ManagerClosed);
        }

        let queue = self
            .get_queue(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                name: queue_name.to_string(),
            })?;

        let envelope = JobEnvelope::new(payload, self.clock.epoch_millis(), options.delay);
        let id = queue
            .channel()
            .submit(envelope)
            .map_err(|source| QueueError::Submission {
                queue: queue_name.to_string(),
                source,
            })?;

        log::trace!("job {id} accepted on '{queue_name}'");
        Ok(())
    }

    /// Register a worker consuming the named queue with the given
    /// processor, emitting `WorkerCreated`.
    ///
    /// The queue must already be registered. Multiple workers may
    /// consume the same queue; each envelope is still delivered to at
    /// most one of them.
    pub fn create_worker(
        &self,
        queue_name: &str,
        processor: Arc<dyn Processor>,
        options: WorkerOptions,
    ) -> QueueResult<Arc<Worker>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::ManagerClosed);
        }

        let queue = self
            .get_queue(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                name: queue_name.to_string(),
            })?;

        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let worker = Worker::spawn(
            id,
            queue_name.to_string(),
            Arc::clone(queue.channel()),
            processor,
            options,
            Arc::clone(&self.events),
        );

        self.workers.lock().unwrap().push(Arc::clone(&worker));
        log::debug!(
            "worker {id} ({}) registered on '{queue_name}'",
            worker.processor_name()
        );
        self.events
            .notify(&ManagerEvent::WorkerCreated(Arc::clone(&worker)));

        Ok(worker)
    }

    /// Register a listener for one event kind
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.events.subscribe(kind, listener)
    }

    /// Deregister a listener; returns whether one was removed
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.events.unsubscribe(kind, id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Graceful shutdown.
    ///
    /// Drains and closes every registered worker first, then closes all
    /// queues and the shared connection, and finally emits
    /// `ManagerClosed` exactly once. Subsequent structural calls fail
    /// with `ManagerClosed`; a fresh manager is required afterwards.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        log::info!("queue manager closing");

        // Workers drain before their channels disappear underneath them
        let workers: Vec<Arc<Worker>> = {
            let mut workers = self.workers.lock().unwrap();
            workers.drain(..).collect()
        };
        futures::future::join_all(workers.iter().map(|worker| worker.close())).await;

        let queue_count = {
            let mut queues = self.queues.lock().unwrap();
            let count = queues.len();
            queues.clear();
            count
        };
        self.connection.close();

        log::info!("queue manager closed ({queue_count} queues released)");
        self.events.notify(&ManagerEvent::ManagerClosed);
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("endpoint", &self.connection.endpoint())
            .field("queues", &self.queues.lock().unwrap().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
