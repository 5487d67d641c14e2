//! Unified error types for the Pennywise client.

use std::time::Duration;

use pennywise_protocol::ProtocolError;
use pennywise_session::SessionError;
use pennywise_transport::TransportError;

use crate::ConfigError;

/// The auth failure an application sees.
///
/// Every way a request can fail for authentication reasons collapses to one
/// of these, so UI code has a single thing to match on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The session is gone; the user has to sign in again.
    #[error("please sign in again ({reason})")]
    ReauthRequired { reason: String },

    /// Refreshes are failing repeatedly and the client is cooling down.
    #[error("auth service temporarily unavailable (retry in {}s)", retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },

    /// The request was still rejected after its one recovery attempt.
    #[error("request unauthorized after session recovery")]
    Unauthorized,
}

impl AuthError {
    /// `true` if the application should route the user to the login page.
    pub fn requires_login(&self) -> bool {
        !matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::CircuitOpen { retry_after } => Self::CircuitOpen { retry_after },
            other => Self::ReauthRequired {
                reason: other.to_string(),
            },
        }
    }
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PennywiseError {
    /// Authentication failed; see [`AuthError::requires_login`].
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A transport-level error (connection, URL, request building).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (sign-in, storage).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The API answered with a non-2xx status that isn't an auth failure.
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

impl PennywiseError {
    /// The auth failure, if this is one.
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pennywise_transport::RefreshFailure;

    #[test]
    fn test_circuit_open_does_not_require_login() {
        let err = AuthError::CircuitOpen {
            retry_after: Duration::from_secs(12),
        };
        assert!(!err.requires_login());
        assert!(err.to_string().contains("12s"));
    }

    #[test]
    fn test_reauth_and_unauthorized_require_login() {
        assert!(AuthError::Unauthorized.requires_login());
        assert!(
            AuthError::ReauthRequired {
                reason: "expired".into()
            }
            .requires_login()
        );
    }

    #[test]
    fn test_from_session_error_keeps_circuit_open_distinct() {
        let err: AuthError = SessionError::CircuitOpen {
            retry_after: Duration::from_secs(5),
        }
        .into();
        assert_eq!(
            err,
            AuthError::CircuitOpen {
                retry_after: Duration::from_secs(5)
            }
        );

        let err: AuthError =
            SessionError::RefreshFailed(RefreshFailure::Server { status: 502 }).into();
        assert!(matches!(err, AuthError::ReauthRequired { ref reason } if reason.contains("502")));
    }

    #[test]
    fn test_from_transport_error() {
        let err: PennywiseError = TransportError::Status(500).into();
        assert!(matches!(err, PennywiseError::Transport(_)));
        assert!(err.to_string().contains("500"));
        assert_eq!(err.as_auth(), None);
    }

    #[test]
    fn test_from_auth_error() {
        let err: PennywiseError = AuthError::Unauthorized.into();
        assert_eq!(err.as_auth(), Some(&AuthError::Unauthorized));
    }
}
