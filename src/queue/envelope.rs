//! Job envelope and submission options

use serde::Serialize;
use std::time::Duration;

/// Options accepted by job submission
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Hold the envelope back for this long before it becomes eligible
    /// for delivery
    pub delay: Option<Duration>,
}

impl JobOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

/// The unit of work placed on a queue: the caller's payload wrapped
/// with a submission timestamp and an optional delivery delay.
///
/// The queue's channel owns the envelope until a worker claims it;
/// ownership transfers to the worker for the duration of processing.
#[derive(Debug, Clone, Serialize)]
pub struct JobEnvelope {
    /// Identifier assigned by the channel at submission
    pub id: u64,
    /// Caller-supplied payload
    pub payload: serde_json::Value,
    /// Submission time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Delivery delay in milliseconds (zero delivers immediately)
    pub delay_ms: u64,
    #[serde(skip)]
    pub(crate) attempts: u32,
}

impl JobEnvelope {
    pub(crate) fn new(payload: serde_json::Value, timestamp: u64, delay: Option<Duration>) -> Self {
        Self {
            id: 0,
            payload,
            timestamp,
            delay_ms: delay.map(|delay| delay.as_millis() as u64).unwrap_or(0),
            attempts: 0,
        }
    }

    /// The delivery delay as a duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Delivery attempts consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
