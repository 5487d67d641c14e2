//! Circuit breaker for the refresh endpoint.
//!
//! # States
//! - Closed: refreshes go through.
//! - Open: `now < open_until`; refreshes fail fast without touching the
//!   network.
//! - Half-open: the cool-down has elapsed; exactly one probe refresh is
//!   admitted. Its result closes or reopens the breaker.
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      consecutive_failures reaches threshold
//! Open      → Half-open: cool-down elapsed, next try_acquire()
//! Half-open → Closed:    probe succeeds
//! Half-open → Open:      probe fails (cool-down per CooldownPolicy)
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{AuthEvent, Clock, EventBus};

/// How long the breaker stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownPolicy {
    /// Every opening uses the base cool-down.
    Fixed,
    /// The cool-down doubles for each failure past the threshold, up to `max`.
    Exponential { max: Duration },
}

/// Consecutive-failure bookkeeping.
///
/// `open_until` is only ever set while `consecutive_failures >= threshold`,
/// and both reset together on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub open_until: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct BreakerState {
    failures: FailureState,
    /// A half-open probe has been admitted and hasn't reported back.
    probing: bool,
}

/// Tracks refresh failures and decides whether another attempt may run.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    policy: CooldownPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(
        threshold: u32,
        cooldown: Duration,
        policy: CooldownPolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            policy,
            clock,
            events,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// `true` while the cool-down is running.
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .failures
            .open_until
            .is_some_and(|until| now < until)
    }

    /// Time left in the current cool-down, if open.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let until = self.state.lock().failures.open_until?;
        until.duration_since(now).ok().filter(|d| !d.is_zero())
    }

    /// Admission check for a new refresh attempt.
    ///
    /// Closed always admits. Open denies until the cool-down elapses, then
    /// admits a single probe; further calls are denied until that probe
    /// reports through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.failures.open_until {
            None => true,
            Some(until) if now < until => false,
            Some(_) if state.probing => false,
            Some(_) => {
                state.probing = true;
                debug!(
                    consecutive_failures = state.failures.consecutive_failures,
                    "cool-down elapsed, admitting probe refresh"
                );
                true
            }
        }
    }

    pub fn record_success(&self) {
        let was_open = {
            let mut state = self.state.lock();
            let was_open = state.failures.open_until.is_some();
            *state = BreakerState::default();
            was_open
        };
        if was_open {
            info!("refresh succeeded, circuit closed");
            self.events.emit(AuthEvent::CircuitClosed);
        }
    }

    /// Counts a failure, opening the breaker at the threshold. Returns the
    /// updated failure state.
    pub fn record_failure(&self) -> FailureState {
        let now = self.clock.now();
        let (snapshot, opened) = {
            let mut state = self.state.lock();
            state.probing = false;
            state.failures.consecutive_failures =
                state.failures.consecutive_failures.saturating_add(1);
            let failures = state.failures.consecutive_failures;
            let opened = if failures >= self.threshold {
                let until = now + self.cooldown_for(failures);
                state.failures.open_until = Some(until);
                Some(until)
            } else {
                None
            };
            (state.failures, opened)
        };

        if let Some(until) = opened {
            warn!(
                consecutive_failures = snapshot.consecutive_failures,
                cooldown_secs = until.duration_since(now).map(|d| d.as_secs()).unwrap_or(0),
                "refresh failing repeatedly, circuit opened"
            );
            self.events.emit(AuthEvent::CircuitOpened {
                until,
                consecutive_failures: snapshot.consecutive_failures,
            });
        }
        snapshot
    }

    pub fn failure_state(&self) -> FailureState {
        self.state.lock().failures
    }

    fn cooldown_for(&self, failures: u32) -> Duration {
        match self.policy {
            CooldownPolicy::Fixed => self.cooldown,
            CooldownPolicy::Exponential { max } => {
                let extra = failures.saturating_sub(self.threshold).min(16);
                self.cooldown.saturating_mul(1u32 << extra).min(max)
            }
        }
    }
}
