//! Event types for the queue manager broadcaster

use crate::queue::{Queue, Worker};
use std::fmt;
use std::sync::Arc;

/// The kinds of event the manager can emit, used as subscription keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueueCreated,
    QueueRemoved,
    WorkerCreated,
    WorkerRemoved,
    WorkerUpdated,
    NewListener,
    RemoveListener,
    ManagerClosed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::QueueCreated => "queueCreated",
            EventKind::QueueRemoved => "queueRemoved",
            EventKind::WorkerCreated => "workerCreated",
            EventKind::WorkerRemoved => "workerRemoved",
            EventKind::WorkerUpdated => "workerUpdated",
            EventKind::NewListener => "newListener",
            EventKind::RemoveListener => "removeListener",
            EventKind::ManagerClosed => "queueManagerClosed",
        };
        f.write_str(name)
    }
}

/// A manager lifecycle event together with its payload.
///
/// Each variant carries exactly the handle its subscribers need, so a
/// listener registered for queue events cannot receive a worker handle
/// by mistake.
#[derive(Clone, Debug)]
pub enum ManagerEvent {
    QueueCreated(Arc<Queue>),
    QueueRemoved(Arc<Queue>),
    WorkerCreated(Arc<Worker>),
    WorkerRemoved(Arc<Worker>),
    WorkerUpdated(Arc<Worker>),
    /// A listener was registered for the named kind
    NewListener(EventKind),
    /// A listener was deregistered from the named kind
    RemoveListener(EventKind),
    ManagerClosed,
}

impl ManagerEvent {
    /// The kind this event is delivered under
    pub fn kind(&self) -> EventKind {
        match self {
            ManagerEvent::QueueCreated(_) => EventKind::QueueCreated,
            ManagerEvent::QueueRemoved(_) => EventKind::QueueRemoved,
            ManagerEvent::WorkerCreated(_) => EventKind::WorkerCreated,
            ManagerEvent::WorkerRemoved(_) => EventKind::WorkerRemoved,
            ManagerEvent::WorkerUpdated(_) => EventKind::WorkerUpdated,
            ManagerEvent::NewListener(_) => EventKind::NewListener,
            ManagerEvent::RemoveListener(_) => EventKind::RemoveListener,
            ManagerEvent::ManagerClosed => EventKind::ManagerClosed,
        }
    }
}
