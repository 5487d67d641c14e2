//! Error types for the transport layer.

use pennywise_protocol::ProtocolError;

/// Why a refresh (or sign-in) call did not produce a token.
///
/// Only [`RefreshFailure::Rejected`] is terminal: the backend has said the
/// refresh credential is no good, so retrying cannot help. Everything else
/// is transient and left to the circuit breaker's failure counting.
///
/// `Clone` because one outcome is handed to every caller waiting on the
/// same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    /// No response: connection refused, DNS failure, reset mid-body.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its deadline. Counted like a network failure.
    #[error("refresh timed out")]
    Timeout,

    /// A non-2xx status that says nothing about the credential (5xx, 429,
    /// a 400 without `invalid_grant`).
    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    /// The backend explicitly denied the refresh credential.
    #[error("refresh credential rejected: {0}")]
    Rejected(String),

    /// A 2xx response whose body could not be turned into a token.
    #[error("malformed token response: {0}")]
    Malformed(String),
}

impl RefreshFailure {
    /// `true` if the session can't be recovered without signing in again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Short, stable label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Server { .. } => "server",
            Self::Rejected(_) => "rejected",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<ProtocolError> for RefreshFailure {
    fn from(err: ProtocolError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors from transport operations other than refresh/sign-in.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Building or sending the HTTP request failed.
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("unexpected status: HTTP {0}")]
    Status(u16),

    /// The configured base URL can't be used.
    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    /// Encoding a request body failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
