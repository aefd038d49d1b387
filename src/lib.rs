//! jobq - background job queue manager
//!
//! A process-wide queue manager that owns a shared broker connection,
//! a registry of named job queues, the worker loops consuming them, and
//! a typed event broadcaster feeding monitoring surfaces.
//!
//! The web/HTTP layer that submits jobs and supplies per-queue
//! processing logic lives outside this crate; it talks to the manager
//! through [`queue::QueueManager`].

pub mod app;
pub mod broker;
pub mod core;
pub mod notifications;
pub mod queue;
