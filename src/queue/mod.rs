//! Named Job Queue Management
//!
//! Background job queues over a single shared broker connection, with
//! dynamic queue and worker registration and a typed lifecycle event
//! stream for observers.
//!
//! # Overview
//!
//! Collaborators create named queues (or rely on the predefined set
//! established at bootstrap), submit jobs through the manager, and
//! attach workers that consume envelopes with a processing function.
//! Every structural change is broadcast to subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  add_job   ┌─────────────────────────────────────┐
//! │ web layer  ├───────────►│          QueueManager               │
//! └────────────┘            │  ┌───────────────────────────────┐  │
//!                           │  │ registry: name → Queue handle │  │
//! ┌────────────┐ subscribe  │  └──────────────┬────────────────┘  │
//! │ dashboard  │◄───────────┤                 │ shared connection │
//! └────────────┘   events   │  ┌──────────────▼────────────────┐  │
//!                           │  │ JobChannel per queue (broker) │  │
//!                           │  └──────────────┬────────────────┘  │
//!                           └─────────────────┼───────────────────┘
//!                                             │ claim
//!                              ┌──────────────┴──────┐
//!                              │ Worker loops (1..n) │
//!                              └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use jobq::core::config::ConnectionSettings;
//! use jobq::queue::{JobEnvelope, JobOptions, ProcessingError, Processor, QueueManager, WorkerOptions};
//! use std::sync::Arc;
//!
//! struct EmailProcessor;
//!
//! #[jobq::queue::async_trait]
//! impl Processor for EmailProcessor {
//!     async fn process(&self, envelope: &JobEnvelope) -> Result<(), ProcessingError> {
//!         println!("sending email: {}", envelope.payload);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = QueueManager::new(ConnectionSettings::from_env()?)?;
//! manager.create_worker("email", Arc::new(EmailProcessor), WorkerOptions::default())?;
//! manager
//!     .add_job("email", serde_json::json!({ "to": "a@b.com" }), JobOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod envelope;
pub mod error;
mod manager;
mod queue;
mod shared;
mod worker;

pub use envelope::{JobEnvelope, JobOptions};
pub use error::{ProcessingError, QueueError, QueueResult};
pub use manager::QueueManager;
pub use queue::Queue;
pub use shared::SharedQueue;
pub use worker::{Processor, Worker, WorkerOptions, WorkerState};

// Processor implementations outside the crate need the same async_trait
// attribute the trait was declared with.
pub use async_trait::async_trait;
