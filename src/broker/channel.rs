//! Per-queue delivery channel
//!
//! Holds envelopes between submission and claim. Envelopes without a
//! delay are delivered in submission order; delayed envelopes become
//! eligible at their deadline. An envelope is handed to exactly one
//! claimer: ownership transfers on claim and returns to the channel
//! only through the retry policy.

use crate::broker::BrokerError;
use crate::queue::envelope::JobEnvelope;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Dead-lettered envelopes retained per channel for inspection
const DEAD_LETTER_LIMIT: usize = 256;

/// Delivery counters and backlog sizes for a single channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub ready: usize,
    pub delayed: usize,
    pub completed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

struct DelayedEntry {
    due: Instant,
    sequence: u64,
    envelope: JobEnvelope,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    // Reversed so the BinaryHeap yields the earliest deadline first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct ChannelState {
    next_id: u64,
    ready: VecDeque<JobEnvelope>,
    delayed: BinaryHeap<DelayedEntry>,
    dead: VecDeque<JobEnvelope>,
    completed: u64,
    failed: u64,
    dead_lettered: u64,
    closed: bool,
}

/// Delivery channel for one queue name
pub struct JobChannel {
    name: String,
    backlog_limit: usize,
    max_delivery_attempts: u32,
    state: Mutex<ChannelState>,
    wakeup: Notify,
}

impl JobChannel {
    pub(crate) fn new(name: String, backlog_limit: usize, max_delivery_attempts: u32) -> Self {
        Self {
            name,
            backlog_limit,
            max_delivery_attempts: max_delivery_attempts.max(1),
            state: Mutex::new(ChannelState {
                next_id: 1,
                ready: VecDeque::new(),
                delayed: BinaryHeap::new(),
                dead: VecDeque::new(),
                completed: 0,
                failed: 0,
                dead_lettered: 0,
                closed: false,
            }),
            wakeup: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accept an envelope for delivery, honoring its delay.
    ///
    /// Returns the id assigned to the envelope. Rejects submissions once
    /// the channel is closed or the backlog limit is reached.
    pub fn submit(&self, mut envelope: JobEnvelope) -> Result<u64, BrokerError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(BrokerError::ChannelClosed {
                    name: self.name.clone(),
                });
            }
            if state.ready.len() + state.delayed.len() >= self.backlog_limit {
                return Err(BrokerError::Backlog {
                    name: self.name.clone(),
                    limit: self.backlog_limit,
                });
            }

            let id = state.next_id;
            state.next_id += 1;
            envelope.id = id;

            if envelope.delay_ms > 0 {
                state.delayed.push(DelayedEntry {
                    due: Instant::now() + envelope.delay(),
                    sequence: id,
                    envelope,
                });
            } else {
                state.ready.push_back(envelope);
            }
            id
        };

        self.wakeup.notify_waiters();
        Ok(id)
    }

    /// Claim the next eligible envelope, suspending until one arrives.
    ///
    /// Returns `None` once the channel is closed and its ready work is
    /// drained. Cancel-safe: a cancelled claim never loses an envelope.
    pub async fn claim(&self) -> Option<JobEnvelope> {
        loop {
            // Register for wakeups before inspecting state so a submit
            // between the check and the await cannot be missed.
            let wakeup = self.wakeup.notified();
            tokio::pin!(wakeup);

            let next_due = {
                let mut state = self.state.lock().unwrap();
                Self::promote_due(&mut state);
                if let Some(envelope) = state.ready.pop_front() {
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
                state.delayed.peek().map(|entry| entry.due)
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = &mut wakeup => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => wakeup.await,
            }
        }
    }

    fn promote_due(state: &mut ChannelState) {
        let now = Instant::now();
        while state
            .delayed
            .peek()
            .map(|entry| entry.due <= now)
            .unwrap_or(false)
        {
            if let Some(entry) = state.delayed.pop() {
                state.ready.push_back(entry.envelope);
            }
        }
    }

    /// Record a completed delivery; the envelope is gone for good.
    pub fn report_success(&self, envelope: &JobEnvelope) {
        let mut state = self.state.lock().unwrap();
        state.completed += 1;
        log::trace!("channel '{}': job {} completed", self.name, envelope.id);
    }

    /// Apply the retry policy to a failed delivery.
    ///
    /// While delivery attempts remain the envelope is requeued ahead of
    /// newer work; otherwise it moves to the dead-letter buffer.
    pub fn report_failure(&self, mut envelope: JobEnvelope) {
        let requeued = {
            let mut state = self.state.lock().unwrap();
            state.failed += 1;
            envelope.attempts += 1;

            if envelope.attempts < self.max_delivery_attempts && !state.closed {
                state.ready.push_front(envelope);
                true
            } else {
                log::debug!(
                    "channel '{}': job {} dead-lettered after {} attempts",
                    self.name,
                    envelope.id,
                    envelope.attempts
                );
                state.dead_lettered += 1;
                state.dead.push_back(envelope);
                if state.dead.len() > DEAD_LETTER_LIMIT {
                    state.dead.pop_front();
                }
                false
            }
        };

        if requeued {
            self.wakeup.notify_waiters();
        }
    }

    /// Snapshot of the dead-letter buffer
    pub fn dead_letters(&self) -> Vec<JobEnvelope> {
        self.state.lock().unwrap().dead.iter().cloned().collect()
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.state.lock().unwrap();
        ChannelStats {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            completed: state.completed,
            failed: state.failed,
            dead_lettered: state.dead_lettered,
        }
    }

    /// Stop accepting submissions and wake all claimers. Idempotent.
    ///
    /// Ready envelopes may still be claimed; claimers see `None` once
    /// the channel is drained.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.wakeup.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn channel() -> JobChannel {
        JobChannel::new("test".to_string(), 100, 1)
    }

    fn envelope(tag: &str) -> JobEnvelope {
        JobEnvelope::new(json!({ "tag": tag }), 0, None)
    }

    fn delayed_envelope(tag: &str, delay: Duration) -> JobEnvelope {
        JobEnvelope::new(json!({ "tag": tag }), 0, Some(delay))
    }

    #[tokio::test]
    async fn test_submission_order_is_preserved() {
        let channel = channel();

        channel.submit(envelope("a")).unwrap();
        channel.submit(envelope("b")).unwrap();
        channel.submit(envelope("c")).unwrap();

        for expected in ["a", "b", "c"] {
            let claimed = channel.claim().await.unwrap();
            assert_eq!(claimed.payload["tag"], expected);
        }
        assert_eq!(channel.stats().ready, 0);
    }

    #[tokio::test]
    async fn test_claim_waits_for_submission() {
        let channel = Arc::new(channel());

        let claimer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.claim().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.submit(envelope("late")).unwrap();

        let claimed = claimer.await.unwrap().unwrap();
        assert_eq!(claimed.payload["tag"], "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_envelope_not_claimable_before_deadline() {
        let channel = channel();
        let start = Instant::now();

        channel
            .submit(delayed_envelope("slow", Duration::from_millis(5000)))
            .unwrap();
        assert_eq!(channel.stats().delayed, 1);

        // Not eligible during the first second
        assert!(timeout(Duration::from_secs(1), channel.claim())
            .await
            .is_err());

        let claimed = channel.claim().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5000));
        assert_eq!(claimed.payload["tag"], "slow");
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_work_overtakes_delayed_work() {
        let channel = channel();

        channel
            .submit(delayed_envelope("later", Duration::from_millis(100)))
            .unwrap();
        channel.submit(envelope("now")).unwrap();

        assert_eq!(channel.claim().await.unwrap().payload["tag"], "now");
        assert_eq!(channel.claim().await.unwrap().payload["tag"], "later");
    }

    #[tokio::test]
    async fn test_close_drains_ready_work_then_stops() {
        let channel = channel();

        channel.submit(envelope("leftover")).unwrap();
        channel.close();

        assert!(channel.is_closed());
        assert_eq!(channel.claim().await.unwrap().payload["tag"], "leftover");
        assert!(channel.claim().await.is_none());

        let rejected = channel.submit(envelope("too-late"));
        assert!(matches!(rejected, Err(BrokerError::ChannelClosed { .. })));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_claimers() {
        let channel = Arc::new(channel());

        let claimer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.claim().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        assert!(claimer.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backlog_limit_rejects_submissions() {
        let channel = JobChannel::new("small".to_string(), 2, 1);

        channel.submit(envelope("a")).unwrap();
        channel
            .submit(delayed_envelope("b", Duration::from_secs(60)))
            .unwrap();

        match channel.submit(envelope("c")) {
            Err(BrokerError::Backlog { limit, .. }) => assert_eq!(limit, 2),
            other => panic!("expected backlog error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_retry_policy_requeues_then_dead_letters() {
        let channel = JobChannel::new("retrying".to_string(), 100, 2);

        channel.submit(envelope("flaky")).unwrap();

        // First failure: one attempt left, goes back to the front
        let first = channel.claim().await.unwrap();
        channel.report_failure(first);
        assert_eq!(channel.stats().failed, 1);
        assert_eq!(channel.stats().ready, 1);

        // Second failure: attempts exhausted, dead-lettered
        let second = channel.claim().await.unwrap();
        assert_eq!(second.attempts(), 1);
        channel.report_failure(second);

        let stats = channel.stats();
        assert_eq!(stats.ready, 0);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(channel.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_success_is_counted() {
        let channel = channel();

        channel.submit(envelope("fine")).unwrap();
        let claimed = channel.claim().await.unwrap();
        channel.report_success(&claimed);

        assert_eq!(channel.stats().completed, 1);
    }
}
