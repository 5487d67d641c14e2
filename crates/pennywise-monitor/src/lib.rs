//! Proactive session monitoring for Pennywise.
//!
//! Refreshing only when a request needs a token means the first request
//! after a quiet period pays for the refresh. The monitor checks the
//! session on a timer (and when the app regains focus) so the refresh
//! usually happens before anyone is waiting on it.
//!
//! # Scheduler
//!
//! Timers sit behind the [`Scheduler`] trait:
//! `schedule(interval, callback) -> CancelHandle`. The callback runs on a
//! single periodic task; a slow check delays the next tick instead of
//! overlapping it. Dropping or cancelling the handle ends the task.
//!
//! # Integration
//!
//! ```ignore
//! let monitor = SessionMonitor::start(session.clone(), &TokioScheduler::new(), MonitorConfig::default());
//! // window regained focus:
//! monitor.on_focus().await;
//! // teardown:
//! monitor.stop();
//! ```
//!
//! Every check goes through the session's refresh coordinator, so a check
//! that fires while a request is already refreshing joins that refresh.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use pennywise_session::AuthSession;
use pennywise_transport::AuthTransport;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the session monitor.
///
/// First-check jitter is a property of the scheduler; see
/// [`TokioScheduler::with_jitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between periodic checks. Default: 2 minutes.
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2 * 60),
        }
    }
}

impl MonitorConfig {
    /// Shortest accepted interval.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Clamps `interval` to at least [`Self::MIN_INTERVAL`]. Called by
    /// [`SessionMonitor::start`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "monitor interval too short, clamping to 1s"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Cancels a scheduled task. The task also stops when the handle is dropped.
#[derive(Debug)]
pub struct CancelHandle {
    task: Option<JoinHandle<()>>,
}

impl CancelHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Stops the task. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs a callback periodically.
pub trait Scheduler: Send + Sync + 'static {
    /// Calls `callback` every `interval` until the returned handle is
    /// cancelled or dropped. Calls never overlap.
    fn schedule<F, Fut>(&self, interval: Duration, callback: F) -> CancelHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static;
}

/// [`Scheduler`] on the Tokio timer.
///
/// The first call happens one interval (plus jitter) after scheduling.
/// Ticks missed while a callback runs long are skipped, not replayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler {
    initial_jitter: Duration,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays the first call by a random amount up to `max`, so several
    /// clients started together don't refresh in lockstep.
    pub fn with_jitter(max: Duration) -> Self {
        Self {
            initial_jitter: max,
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.initial_jitter.as_millis() as u64;
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=max_ms))
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule<F, Fut>(&self, interval: Duration, mut callback: F) -> CancelHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // interval_at panics on a zero period
        let period = interval.max(Duration::from_millis(1));
        let start = TokioInstant::now() + period + self.jitter();
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(interval_ms = period.as_millis() as u64, "periodic task scheduled");
        let task = tokio::spawn(async move {
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                tick += 1;
                trace!(tick, "periodic task tick");
                callback().await;
            }
        });
        CancelHandle::new(task)
    }
}

// ---------------------------------------------------------------------------
// Session monitor
// ---------------------------------------------------------------------------

/// Result of one proactive check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The token was valid; nothing was done.
    Fresh,
    /// The token was expiring or missing and a refresh made it usable.
    Refreshed,
    /// The token needed a refresh and couldn't get one (failure or
    /// breaker open).
    Unavailable,
}

/// Keeps a session refreshed ahead of use.
pub struct SessionMonitor<T: AuthTransport> {
    session: AuthSession<T>,
    handle: Option<CancelHandle>,
    checks: Arc<AtomicU64>,
}

impl<T: AuthTransport> SessionMonitor<T> {
    /// Starts periodic checks on `scheduler`.
    pub fn start(session: AuthSession<T>, scheduler: &impl Scheduler, config: MonitorConfig) -> Self {
        let config = config.validated();
        let checks = Arc::new(AtomicU64::new(0));

        let handle = {
            let session = session.clone();
            let checks = Arc::clone(&checks);
            scheduler.schedule(config.interval, move || {
                let session = session.clone();
                let checks = Arc::clone(&checks);
                async move {
                    check(&session, &checks).await;
                }
            })
        };

        debug!(interval_secs = config.interval.as_secs(), "session monitor started");
        Self {
            session,
            handle: Some(handle),
            checks,
        }
    }

    /// The app regained focus (or came back online): check right away.
    pub async fn on_focus(&self) -> CheckOutcome {
        trace!("focus check");
        check(&self.session, &self.checks).await
    }

    /// Runs one check outside the schedule.
    pub async fn check_now(&self) -> CheckOutcome {
        check(&self.session, &self.checks).await
    }

    /// Stops the periodic checks. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
            debug!("session monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Checks run so far, periodic and on demand.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn session(&self) -> &AuthSession<T> {
        &self.session
    }
}

async fn check<T: AuthTransport>(session: &AuthSession<T>, checks: &AtomicU64) -> CheckOutcome {
    checks.fetch_add(1, Ordering::Relaxed);
    if !session.is_token_expired_or_expiring() {
        trace!("session fresh");
        return CheckOutcome::Fresh;
    }
    debug!(state = %session.state(), "session needs refresh");
    if session.ensure_valid_session().await {
        CheckOutcome::Refreshed
    } else {
        CheckOutcome::Unavailable
    }
}
