//! Predefined queue set
//!
//! These queues always exist before any application-specific queue is
//! created; the manager creates them in declaration order during
//! bootstrap.

use strum_macros::{AsRefStr, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum SharedQueue {
    /// Incoming Stripe webhook deliveries handed off by the web layer
    #[strum(serialize = "stripe-webhooks")]
    StripeWebhooks,
    /// Outbound transactional email
    #[strum(serialize = "email")]
    Email,
}

impl SharedQueue {
    /// The queue name used in the registry
    pub fn queue_name(&self) -> &str {
        self.as_ref()
    }
}
