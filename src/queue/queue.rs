//! Named queue handle

use crate::broker::{ChannelStats, JobChannel};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Handle to a named queue registered with the manager.
///
/// At most one canonical handle exists per name process-wide; the
/// registry owns it and hands out clones of the `Arc`. Queues are never
/// destroyed implicitly - only `remove_queue` or manager shutdown
/// releases them.
pub struct Queue {
    name: String,
    created_at: DateTime<Utc>,
    channel: Arc<JobChannel>,
}

impl Queue {
    pub(crate) fn new(name: String, channel: Arc<JobChannel>) -> Self {
        Self {
            name,
            created_at: Utc::now(),
            channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Delivery counters from the queue's backing channel
    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Whether the backing channel has been closed
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub(crate) fn channel(&self) -> &Arc<JobChannel> {
        &self.channel
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish()
    }
}
