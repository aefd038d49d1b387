//! Queue Manager Error Types

use crate::broker::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Required connection parameter missing or invalid at bootstrap.
    /// Fatal: the manager cannot be constructed.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The named queue is not registered; callers recover by creating
    /// the queue first
    #[error("queue not found: {name}")]
    QueueNotFound { name: String },

    /// The backing store rejected or failed to accept a job envelope
    #[error("job submission to queue '{queue}' failed")]
    Submission {
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// The manager has been closed; a fresh manager (and connection) is
    /// required for further queue or worker creation
    #[error("queue manager is closed")]
    ManagerClosed,
}

/// Result type for queue manager operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Failure raised by a processor while handling a claimed envelope.
///
/// Caught inside the worker loop and recorded against that job alone;
/// never propagated to sibling jobs or other workers.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ProcessingError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProcessingError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
