//! Embedded backing store for job delivery
//!
//! The store keeps one delivery channel per queue name behind a single
//! shared [`Connection`] handle. Envelopes are owned by their channel
//! from submission until a claimer takes them; delivery order, delay
//! eligibility and the retry/dead-letter policy all live here, not in
//! the queue manager.

mod channel;
mod connection;

pub use channel::{ChannelStats, JobChannel};
pub use connection::Connection;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("channel '{name}' is closed")]
    ChannelClosed { name: String },

    #[error("channel '{name}' backlog is full (limit: {limit})")]
    Backlog { name: String, limit: usize },
}
