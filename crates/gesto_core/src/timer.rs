//! Timeout scheduling
//!
//! Timeout transitions never sleep or spawn threads. They ask a
//! [`TimeoutScheduler`] for a one-shot timer and get back a [`TimerToken`].
//! The host owns the scheduler and, when a timer expires, hands the token back
//! to the interaction (`fire_timeout`). Tokens that no longer match the armed
//! timeout are ignored, so a late delivery after cancellation is harmless.
//!
//! [`TimerQueue`] is a deterministic scheduler driven by a virtual clock. A
//! real event loop advances it by the elapsed frame time; tests advance it by
//! exact amounts.
//!
//! ```
//! use gesto_core::timer::{TimeoutScheduler, TimerQueue};
//! use std::time::Duration;
//!
//! let timers = TimerQueue::new();
//! let token = timers.schedule(Duration::from_millis(500));
//!
//! assert!(timers.advance(Duration::from_millis(499)).is_empty());
//! assert_eq!(timers.advance(Duration::from_millis(1)), vec![token]);
//! ```

use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::time::Duration;

new_key_type! {
    /// Handle to a scheduled one-shot timer
    pub struct TimerToken;
}

/// Scheduling facility used by timeout transitions and throttling
pub trait TimeoutScheduler {
    /// Schedule a one-shot timer expiring after `delay`
    fn schedule(&self, delay: Duration) -> TimerToken;

    /// Cancel a pending timer. Unknown or expired tokens are ignored.
    fn cancel(&self, token: TimerToken);
}

#[derive(Debug)]
struct PendingTimer {
    deadline: Duration,
    /// Scheduling order, breaks ties between equal deadlines
    seq: u64,
}

#[derive(Debug, Default)]
struct QueueInner {
    now: Duration,
    pending: SlotMap<TimerToken, PendingTimer>,
    seq: u64,
    scheduled: usize,
    cancelled: usize,
}

/// Deterministic timer queue with a virtual clock
#[derive(Debug, Default)]
pub struct TimerQueue {
    inner: RefCell<QueueInner>,
}

impl TimerQueue {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Move the clock forward and return the expired tokens in deadline order
    ///
    /// Expired timers are removed from the queue before being returned.
    pub fn advance(&self, elapsed: Duration) -> Vec<TimerToken> {
        let mut inner = self.inner.borrow_mut();
        inner.now += elapsed;
        let now = inner.now;

        let mut expired: Vec<(Duration, u64, TimerToken)> = inner
            .pending
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(token, timer)| (timer.deadline, timer.seq, token))
            .collect();
        expired.sort_by_key(|(deadline, seq, _)| (*deadline, *seq));

        for (_, _, token) in &expired {
            inner.pending.remove(*token);
        }
        expired.into_iter().map(|(_, _, token)| token).collect()
    }

    /// Time until the next pending timer expires
    pub fn next_deadline(&self) -> Option<Duration> {
        let inner = self.inner.borrow();
        inner
            .pending
            .values()
            .map(|timer| timer.deadline.saturating_sub(inner.now))
            .min()
    }

    /// Whether a token is still pending
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.inner.borrow().pending.contains_key(token)
    }

    /// Number of pending timers
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Total number of `schedule` calls
    pub fn scheduled_count(&self) -> usize {
        self.inner.borrow().scheduled
    }

    /// Total number of `cancel` calls that removed a pending timer
    pub fn cancelled_count(&self) -> usize {
        self.inner.borrow().cancelled
    }
}

impl TimeoutScheduler for TimerQueue {
    fn schedule(&self, delay: Duration) -> TimerToken {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now + delay;
        let seq = inner.seq;
        inner.seq += 1;
        inner.scheduled += 1;
        inner.pending.insert(PendingTimer { deadline, seq })
    }

    fn cancel(&self, token: TimerToken) {
        let mut inner = self.inner.borrow_mut();
        if inner.pending.remove(token).is_some() {
            inner.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_in_deadline_order() {
        let timers = TimerQueue::new();
        let late = timers.schedule(Duration::from_millis(300));
        let early = timers.schedule(Duration::from_millis(100));

        let fired = timers.advance(Duration::from_millis(400));
        assert_eq!(fired, vec![early, late]);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_cancel_prevents_delivery() {
        let timers = TimerQueue::new();
        let token = timers.schedule(Duration::from_millis(50));
        timers.cancel(token);
        timers.cancel(token);

        assert!(timers.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(timers.scheduled_count(), 1);
        assert_eq!(timers.cancelled_count(), 1);
    }

    #[test]
    fn test_next_deadline() {
        let timers = TimerQueue::new();
        assert_eq!(timers.next_deadline(), None);

        timers.schedule(Duration::from_millis(250));
        timers.advance(Duration::from_millis(100));
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(150)));
        assert_eq!(timers.now(), Duration::from_millis(100));
    }
}
