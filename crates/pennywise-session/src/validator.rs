//! Session validator.
//!
//! Classifies the current session and, when asked to make it usable,
//! decides whether a refresh is needed.
//!
//! # States
//! ```text
//! CircuitOpen      breaker cooling down (wins over everything else)
//! ExpiredOrMissing no token, or now >= expires_at
//! Expiring         now >= expires_at - lead_time
//! Valid            otherwise, including a token with unknown expiry
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pennywise_protocol::AccessToken;
use pennywise_transport::AuthTransport;
use tracing::debug;

use crate::{CircuitBreaker, Clock, RefreshCoordinator, RefreshOutcome, SessionError, TokenStore};

/// Where the session stands right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    Expiring,
    ExpiredOrMissing,
    CircuitOpen,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Expiring => write!(f, "expiring"),
            Self::ExpiredOrMissing => write!(f, "expired or missing"),
            Self::CircuitOpen => write!(f, "circuit open"),
        }
    }
}

/// Pure classification; `circuit_open` is sampled by the caller.
pub fn classify(
    has_token: bool,
    expires_at: Option<SystemTime>,
    now: SystemTime,
    lead_time: Duration,
    circuit_open: bool,
) -> SessionState {
    if circuit_open {
        return SessionState::CircuitOpen;
    }
    if !has_token {
        return SessionState::ExpiredOrMissing;
    }
    let Some(expires_at) = expires_at else {
        return SessionState::Valid;
    };
    if now >= expires_at {
        return SessionState::ExpiredOrMissing;
    }
    // now + lead >= expires_at, without underflow near the epoch
    if now.checked_add(lead_time).is_none_or(|t| t >= expires_at) {
        SessionState::Expiring
    } else {
        SessionState::Valid
    }
}

/// Decides whether the session is usable and refreshes it when it isn't.
pub struct SessionValidator<T: AuthTransport> {
    store: Arc<TokenStore>,
    breaker: Arc<CircuitBreaker>,
    coordinator: RefreshCoordinator<T>,
    clock: Arc<dyn Clock>,
    lead_time: Duration,
}

impl<T: AuthTransport> Clone for SessionValidator<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            breaker: Arc::clone(&self.breaker),
            coordinator: self.coordinator.clone(),
            clock: Arc::clone(&self.clock),
            lead_time: self.lead_time,
        }
    }
}

impl<T: AuthTransport> SessionValidator<T> {
    pub fn new(
        store: Arc<TokenStore>,
        breaker: Arc<CircuitBreaker>,
        coordinator: RefreshCoordinator<T>,
        clock: Arc<dyn Clock>,
        lead_time: Duration,
    ) -> Self {
        Self {
            store,
            breaker,
            coordinator,
            clock,
            lead_time,
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    pub fn state(&self) -> SessionState {
        let snapshot = self.store.snapshot();
        classify(
            snapshot.access_token.is_some(),
            snapshot.expires_at,
            self.clock.now(),
            self.lead_time,
            self.breaker.is_open(),
        )
    }

    /// `true` unless the session is `Valid`.
    pub fn is_token_expired_or_expiring(&self) -> bool {
        self.state() != SessionState::Valid
    }

    /// Makes sure a usable token is in the store, refreshing if needed.
    ///
    /// `Valid` returns immediately; `CircuitOpen` returns `false` without
    /// touching the network.
    pub async fn ensure_valid_session(&self) -> bool {
        self.check_session().await.is_ok()
    }

    /// Like [`ensure_valid_session`](Self::ensure_valid_session), but says
    /// why the session is unusable and hands back the token to send.
    ///
    /// Once the backend has rejected the refresh credential, no refresh is
    /// attempted until a new token is stored (normally by signing in).
    pub async fn check_session(&self) -> Result<AccessToken, SessionError> {
        let state = self.state();
        debug!(%state, "checking session");
        match state {
            SessionState::Valid => self
                .store
                .access_token()
                .ok_or_else(|| SessionError::ReauthRequired("no access token".into())),
            SessionState::CircuitOpen => Err(self.circuit_open_error()),
            SessionState::Expiring | SessionState::ExpiredOrMissing => {
                if let Some(reason) = self.store.rejected_credential() {
                    debug!(%reason, "refresh credential rejected earlier, not refreshing");
                    return Err(SessionError::ReauthRequired(reason));
                }
                match self.coordinator.refresh_outcome().await {
                    RefreshOutcome::Refreshed { .. } => self
                        .store
                        .access_token()
                        .ok_or_else(|| SessionError::ReauthRequired("session cleared".into())),
                    RefreshOutcome::CircuitOpen => Err(self.circuit_open_error()),
                    RefreshOutcome::Discarded => Err(SessionError::ReauthRequired(
                        "session cleared during refresh".into(),
                    )),
                    RefreshOutcome::Failed(failure) if failure.is_terminal() => {
                        Err(SessionError::ReauthRequired(failure.to_string()))
                    }
                    RefreshOutcome::Failed(failure) => Err(SessionError::RefreshFailed(failure)),
                }
            }
        }
    }

    fn circuit_open_error(&self) -> SessionError {
        SessionError::CircuitOpen {
            retry_after: self.breaker.retry_after().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const LEAD: Duration = Duration::from_secs(300);

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_classify_missing_token_is_expired_or_missing() {
        assert_eq!(
            classify(false, None, at(1_000), LEAD, false),
            SessionState::ExpiredOrMissing
        );
    }

    #[test]
    fn test_classify_circuit_open_wins() {
        assert_eq!(
            classify(true, Some(at(10_000)), at(1_000), LEAD, true),
            SessionState::CircuitOpen
        );
        assert_eq!(classify(false, None, at(1_000), LEAD, true), SessionState::CircuitOpen);
    }

    #[test]
    fn test_classify_lead_boundary_is_expiring() {
        assert_eq!(
            classify(true, Some(at(1_300)), at(1_000), LEAD, false),
            SessionState::Expiring
        );
        assert_eq!(
            classify(true, Some(at(1_301)), at(1_000), LEAD, false),
            SessionState::Valid
        );
    }

    #[test]
    fn test_classify_expiry_boundary_is_expired() {
        assert_eq!(
            classify(true, Some(at(1_000)), at(1_000), LEAD, false),
            SessionState::ExpiredOrMissing
        );
        assert_eq!(
            classify(true, Some(at(999)), at(1_000), LEAD, false),
            SessionState::ExpiredOrMissing
        );
    }

    #[test]
    fn test_classify_unknown_expiry_is_valid() {
        assert_eq!(classify(true, None, at(1_000), LEAD, false), SessionState::Valid);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::ExpiredOrMissing.to_string(), "expired or missing");
        assert_eq!(SessionState::CircuitOpen.to_string(), "circuit open");
    }
}
