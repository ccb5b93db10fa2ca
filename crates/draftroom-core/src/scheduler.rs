// Cancellable per-draft timers.
//
// A `TimerSet` keeps at most one pending timer per key. Every timer carries
// a token; when it fires, the callback must `claim` the token before acting.
// A timer that was cancelled or replaced after its sleep finished fails the
// claim and does nothing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default delay added to snake deadlines before the auto-pick fires.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

struct PendingTimer {
    token: u64,
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

pub struct TimerSet {
    name: &'static str,
    timers: Mutex<HashMap<String, PendingTimer>>,
    next_token: AtomicU64,
}

impl TimerSet {
    pub fn new(name: &'static str) -> Self {
        TimerSet {
            name,
            timers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, PendingTimer>> {
        self.timers.lock().expect("timer mutex poisoned")
    }

    /// Arm a timer for `key` that calls `on_fire(token)` after `delay`.
    /// Any timer already pending for `key` is cancelled first. Must be
    /// called from within a tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        key: &str,
        delay: Duration,
        fire_at: DateTime<Utc>,
        on_fire: F,
    ) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut timers = self.timers();
        if let Some(prev) = timers.remove(key) {
            prev.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(token).await;
        });
        timers.insert(
            key.to_string(),
            PendingTimer {
                token,
                fire_at,
                handle,
            },
        );
        debug!(
            "{} timer {} armed for {} (in {:?})",
            self.name, token, key, delay
        );
        token
    }

    /// Cancel the pending timer for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        match self.timers().remove(key) {
            Some(prev) => {
                prev.handle.abort();
                debug!("{} timer {} for {} cancelled", self.name, prev.token, key);
                true
            }
            None => false,
        }
    }

    /// Take ownership of a fired timer. Returns false when `token` is no
    /// longer the pending timer for `key`.
    pub fn claim(&self, key: &str, token: u64) -> bool {
        let mut timers = self.timers();
        match timers.get(key) {
            Some(pending) if pending.token == token => {
                timers.remove(key);
                true
            }
            _ => false,
        }
    }

    /// When the pending timer for `key` is due, if one is armed.
    pub fn pending(&self, key: &str) -> Option<DateTime<Utc>> {
        self.timers().get(key).map(|t| t.fire_at)
    }

    pub fn len(&self) -> usize {
        self.timers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        if let Ok(timers) = self.timers.get_mut() {
            for (_, pending) in timers.drain() {
                pending.handle.abort();
            }
        }
    }
}

/// Snake pick timers: one per draft, fired a grace period after the
/// deadline.
pub struct AutoPickScheduler {
    timers: TimerSet,
    grace: Duration,
}

impl AutoPickScheduler {
    pub fn new(grace: Duration) -> Self {
        AutoPickScheduler {
            timers: TimerSet::new("auto-pick"),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Arm the auto-pick for `draft_id`. A deadline already in the past
    /// fires immediately; otherwise the timer fires at
    /// `deadline + grace`.
    pub fn schedule<F, Fut>(
        &self,
        draft_id: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
        on_fire: F,
    ) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (delay, fire_at) = match (deadline - now).to_std() {
            Ok(until) if !until.is_zero() => {
                let delay = until + self.grace;
                let grace = chrono::Duration::from_std(self.grace)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                (delay, deadline + grace)
            }
            _ => (Duration::ZERO, now),
        };
        self.timers.schedule(draft_id, delay, fire_at, on_fire)
    }

    pub fn cancel(&self, draft_id: &str) -> bool {
        self.timers.cancel(draft_id)
    }

    pub fn claim(&self, draft_id: &str, token: u64) -> bool {
        self.timers.claim(draft_id, token)
    }

    pub fn pending(&self, draft_id: &str) -> Option<DateTime<Utc>> {
        self.timers.pending(draft_id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for AutoPickScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}
