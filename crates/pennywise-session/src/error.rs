//! Error types for the session layer.

use std::time::Duration;

use pennywise_transport::RefreshFailure;

/// Errors that can occur while keeping a session alive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The circuit breaker is open: refreshes have failed repeatedly and
    /// the client is cooling down. Nothing was sent over the network.
    #[error("auth service temporarily unavailable (retry in {}s)", retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },

    /// The session can't continue without the user signing in again.
    /// Covers missing tokens, rejected refresh credentials, and sessions
    /// cleared while a refresh was running.
    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    /// A refresh was attempted and failed for a transient reason.
    #[error("token refresh failed: {0}")]
    RefreshFailed(RefreshFailure),

    /// Signing in with credentials failed.
    #[error("sign-in failed: {0}")]
    SignIn(RefreshFailure),

    /// The durable side-channel could not be read or written.
    #[error("session storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// `true` for failures caused by the breaker rather than by the
    /// session itself.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}
