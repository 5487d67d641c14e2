//! Refresh coordinator: one refresh on the wire at a time.
//!
//! Callers never talk to the transport directly. They ask the coordinator,
//! which either hands them the handle of the refresh already in flight or
//! starts a new one (if the circuit breaker allows it). Every holder of a
//! handle awaits the same shared future, so N concurrent callers cost one
//! network call and all see the same [`RefreshOutcome`].
//!
//! ```text
//! refresh_outcome() ─┬─ slot has handle ──────────────→ wait on it
//!                    ├─ breaker denies ───────────────→ CircuitOpen (no I/O)
//!                    └─ spawn task, store handle ─────→ wait on it
//!
//! task: transport.refresh() with timeout
//!       → breaker.record_success / record_failure
//!       → store.set_if_generation (or reject_credential on rejection)
//!       → empty the slot
//! ```
//!
//! The refresh runs in its own Tokio task. It completes even if every
//! waiter is dropped, so the breaker and the store always learn the result.
//! If the task dies instead (a panic in the transport), the slot is still
//! emptied and the attempt counts as a failure.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use pennywise_transport::{AuthTransport, RefreshFailure};
use tracing::{debug, info, trace, warn};

use crate::{AuthEvent, CircuitBreaker, ClearReason, EventBus, TokenStore};

/// How a refresh ended, as seen by every caller that waited on it.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new token is in the store.
    Refreshed { expires_at: Option<SystemTime> },
    /// The call failed; see the failure for whether it was terminal.
    Failed(RefreshFailure),
    /// The breaker refused the attempt. No network call was made.
    CircuitOpen,
    /// The call succeeded but the session was cleared meanwhile, so the
    /// token was thrown away.
    Discarded,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

/// Handle to a refresh that is on the wire.
///
/// Cloning is cheap; every clone resolves to the same outcome.
#[derive(Clone)]
pub struct InFlightRefresh {
    id: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

impl InFlightRefresh {
    /// Sequence number of this refresh (1 for the first one).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the refresh to finish.
    pub async fn wait(self) -> RefreshOutcome {
        self.outcome.await
    }
}

impl fmt::Debug for InFlightRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRefresh")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Serializes refreshes and publishes their outcome.
pub struct RefreshCoordinator<T: AuthTransport> {
    inner: Arc<CoordinatorInner<T>>,
}

impl<T: AuthTransport> Clone for RefreshCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<T> {
    transport: T,
    store: Arc<TokenStore>,
    breaker: Arc<CircuitBreaker>,
    events: EventBus,
    timeout: Duration,
    in_flight: Mutex<Option<InFlightRefresh>>,
    next_id: AtomicU64,
    refresh_calls: AtomicU64,
}

impl<T: AuthTransport> RefreshCoordinator<T> {
    pub fn new(
        transport: T,
        store: Arc<TokenStore>,
        breaker: Arc<CircuitBreaker>,
        events: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                store,
                breaker,
                events,
                timeout,
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(0),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Refreshes the access token. `true` only if a new token was stored.
    pub async fn refresh(&self) -> bool {
        self.refresh_outcome().await.is_success()
    }

    /// Refreshes the access token and reports how it went.
    ///
    /// Asks the backend whenever the breaker allows it, even after the
    /// refresh credential was rejected. [`SessionValidator`] does not.
    ///
    /// [`SessionValidator`]: crate::SessionValidator
    pub async fn refresh_outcome(&self) -> RefreshOutcome {
        match self.begin() {
            Some(handle) => handle.wait().await,
            None => RefreshOutcome::CircuitOpen,
        }
    }

    /// Joins the in-flight refresh or starts one.
    ///
    /// Returns `None` without any I/O when nothing is in flight and the
    /// breaker denies a new attempt.
    pub fn begin(&self) -> Option<InFlightRefresh> {
        let mut slot = self.inner.in_flight.lock();
        if let Some(existing) = slot.as_ref() {
            trace!(attempt = existing.id, "joining in-flight refresh");
            return Some(existing.clone());
        }
        if !self.inner.breaker.try_acquire() {
            debug!("circuit open, refresh skipped");
            return None;
        }
        let handle = self.spawn_refresh();
        *slot = Some(handle.clone());
        Some(handle)
    }

    /// The refresh currently on the wire, if any.
    pub fn in_flight(&self) -> Option<InFlightRefresh> {
        self.inner.in_flight.lock().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Refresh calls actually sent to the transport so far.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // Called with the slot locked: the task can't empty the slot before the
    // handle is stored in it.
    fn spawn_refresh(&self) -> InFlightRefresh {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let generation = self.inner.store.generation();
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move { inner.run(id, generation).await });
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                RefreshOutcome::Failed(RefreshFailure::Network(format!(
                    "refresh task ended abnormally: {e}"
                )))
            })
        }
        .boxed()
        .shared();

        InFlightRefresh { id, outcome }
    }
}

impl<T: AuthTransport> CoordinatorInner<T> {
    async fn run(&self, id: u64, generation: u64) -> RefreshOutcome {
        let mut settle = Settle {
            inner: self,
            id,
            recorded: false,
        };
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        self.events.emit(AuthEvent::RefreshStarted { attempt: id });
        debug!(attempt = id, "refresh started");

        let result = match tokio::time::timeout(self.timeout, self.transport.refresh()).await {
            Ok(result) => result,
            Err(_) => Err(RefreshFailure::Timeout),
        };

        let outcome = match result {
            Ok(grant) => {
                self.breaker.record_success();
                settle.recorded = true;
                if self.store.set_if_generation(generation, &grant) {
                    info!(
                        attempt = id,
                        expires_at = ?grant.expires_at.map(pennywise_protocol::unix_seconds),
                        "access token refreshed"
                    );
                    self.events.emit(AuthEvent::RefreshSucceeded {
                        expires_at: grant.expires_at,
                    });
                    RefreshOutcome::Refreshed {
                        expires_at: grant.expires_at,
                    }
                } else {
                    info!(attempt = id, "session cleared during refresh, discarding token");
                    self.events.emit(AuthEvent::RefreshDiscarded);
                    RefreshOutcome::Discarded
                }
            }
            Err(failure) => {
                let state = self.breaker.record_failure();
                settle.recorded = true;
                warn!(
                    attempt = id,
                    kind = failure.kind(),
                    error = %failure,
                    consecutive_failures = state.consecutive_failures,
                    "refresh failed"
                );
                self.events.emit(AuthEvent::RefreshFailed {
                    failure: failure.clone(),
                    consecutive_failures: state.consecutive_failures,
                });
                if failure.is_terminal() {
                    self.store.reject_credential(failure.to_string());
                    self.events.emit(AuthEvent::SessionCleared {
                        reason: ClearReason::RefreshRejected,
                    });
                }
                RefreshOutcome::Failed(failure)
            }
        };

        drop(settle);
        outcome
    }
}

/// Empties the in-flight slot when a refresh task ends, however it ends.
///
/// If the task unwinds before the breaker heard about the attempt, the
/// attempt is recorded as a failure so a half-open probe can't stay stuck.
struct Settle<'a, T> {
    inner: &'a CoordinatorInner<T>,
    id: u64,
    recorded: bool,
}

impl<T> Drop for Settle<'_, T> {
    fn drop(&mut self) {
        if !self.recorded {
            let state = self.inner.breaker.record_failure();
            warn!(
                attempt = self.id,
                consecutive_failures = state.consecutive_failures,
                "refresh task ended abnormally"
            );
        }
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().is_some_and(|h| h.id == self.id) {
            *slot = None;
        }
    }
}
