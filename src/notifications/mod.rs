//! Lifecycle event broadcasting
//!
//! Structural changes to the queue manager (queues and workers appearing
//! or disappearing, the manager closing) are published as a closed set
//! of tagged events through a typed publish/subscribe broadcaster.
//! Monitoring surfaces such as an admin dashboard subscribe here to
//! mirror the manager's state.

mod broadcaster;
mod event;

pub use broadcaster::{EventBroadcaster, Listener, SubscriptionId};
pub use event::{EventKind, ManagerEvent};
