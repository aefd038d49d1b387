//! Shared broker connection handle

use crate::broker::channel::JobChannel;
use crate::core::config::ConnectionSettings;
use crate::queue::error::{QueueError, QueueResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// The single connection to the backing store, shared by every queue
/// and worker the manager owns.
///
/// Cloning is cheap; all clones refer to the same channel table. No
/// component closes the connection individually: only the manager tears
/// it down, after dependent queues and workers have stopped using it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    settings: ConnectionSettings,
    channels: Mutex<HashMap<String, Arc<JobChannel>>>,
    closed: AtomicBool,
}

impl Connection {
    /// Open a connection to the store described by `settings`.
    ///
    /// Fails fast with a configuration error when the host is unset.
    pub fn open(settings: ConnectionSettings) -> QueueResult<Self> {
        if settings.host.trim().is_empty() {
            return Err(QueueError::Configuration {
                message: "broker host is empty".to_string(),
            });
        }

        log::debug!(
            "broker connection to {}:{} opened",
            settings.host,
            settings.port
        );

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                settings,
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The endpoint this connection talks to, for logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.inner.settings.host, self.inner.settings.port)
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Get or create the delivery channel for a queue name
    pub fn channel(&self, name: &str) -> Arc<JobChannel> {
        let mut channels = self.inner.channels.lock().unwrap();
        Arc::clone(channels.entry(name.to_string()).or_insert_with(|| {
            Arc::new(JobChannel::new(
                name.to_string(),
                self.inner.settings.channel_backlog,
                self.inner.settings.max_delivery_attempts,
            ))
        }))
    }

    /// Remove a channel from the table and close it.
    ///
    /// Claimers blocked on the channel observe the close and stop.
    pub fn release(&self, name: &str) -> Option<Arc<JobChannel>> {
        let removed = self.inner.channels.lock().unwrap().remove(name);
        if let Some(channel) = &removed {
            channel.close();
        }
        removed
    }

    /// Names of all channels currently held by the connection
    pub fn channel_names(&self) -> Vec<String> {
        self.inner.channels.lock().unwrap().keys().cloned().collect()
    }

    /// Close every channel and mark the connection closed. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let channels: Vec<Arc<JobChannel>> = {
            let mut table = self.inner.channels.lock().unwrap();
            table.drain().map(|(_, channel)| channel).collect()
        };
        for channel in channels {
            channel.close();
        }

        log::debug!("broker connection to {} closed", self.endpoint());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_a_host() {
        let result = Connection::open(ConnectionSettings::new(""));
        assert!(matches!(result, Err(QueueError::Configuration { .. })));
    }

    #[test]
    fn test_channel_is_created_once_per_name() {
        let connection = Connection::open(ConnectionSettings::new("localhost")).unwrap();

        let first = connection.channel("email");
        let second = connection.channel("email");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connection.channel_names(), vec!["email".to_string()]);
    }

    #[test]
    fn test_release_closes_the_channel() {
        let connection = Connection::open(ConnectionSettings::new("localhost")).unwrap();

        let channel = connection.channel("email");
        let released = connection.release("email").unwrap();

        assert!(Arc::ptr_eq(&channel, &released));
        assert!(channel.is_closed());
        assert!(connection.channel_names().is_empty());
        assert!(connection.release("email").is_none());
    }

    #[test]
    fn test_close_is_idempotent_and_closes_everything() {
        let connection = Connection::open(ConnectionSettings::new("localhost")).unwrap();

        let email = connection.channel("email");
        let webhooks = connection.channel("stripe-webhooks");

        connection.close();
        connection.close();

        assert!(connection.is_closed());
        assert!(email.is_closed());
        assert!(webhooks.is_closed());
        assert!(connection.channel_names().is_empty());
    }
}
