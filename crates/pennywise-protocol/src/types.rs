//! Request and response bodies of the auth endpoints.
//!
//! Field names follow the backend's JSON: token responses are camelCase
//! (`accessToken`, `expiresAt`), error bodies use the OAuth-style snake_case
//! (`error`, `error_description`).

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, jwt_expiry};

// ---------------------------------------------------------------------------
// AccessToken
// ---------------------------------------------------------------------------

/// A short-lived bearer credential.
///
/// The `Debug` impl never prints the secret, so tokens can sit inside
/// structs that end up in `tracing` fields.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

impl From<&str> for AccessToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Token responses
// ---------------------------------------------------------------------------

/// Body of a successful refresh or sign-in response.
///
/// `expires_at` is an absolute unix timestamp in seconds; `expires_in` is a
/// lifetime in seconds relative to the moment the response was received.
/// Either, both, or neither may be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Resolves the response into a [`TokenGrant`].
    ///
    /// Expiry precedence: `expiresAt`, then `now + expiresIn`, then the
    /// token's own JWT `exp` claim. If none is available the expiry stays
    /// unknown. A value too large for [`SystemTime`] counts as absent.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidPayload`] for a blank access token.
    pub fn into_grant(self, now: SystemTime) -> Result<TokenGrant, ProtocolError> {
        if self.access_token.trim().is_empty() {
            return Err(ProtocolError::InvalidPayload(
                "access token is empty".into(),
            ));
        }

        let expires_at = self
            .expires_at
            .and_then(from_unix_seconds)
            .or_else(|| {
                self.expires_in
                    .and_then(|secs| now.checked_add(Duration::from_secs(secs)))
            })
            .or_else(|| jwt_expiry(&self.access_token));

        Ok(TokenGrant {
            access_token: AccessToken::new(self.access_token),
            expires_at,
        })
    }
}

/// An access token together with its (possibly unknown) expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub expires_at: Option<SystemTime>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            access_token: AccessToken::new(access_token),
            expires_at,
        }
    }
}

/// Error body returned by the auth endpoints on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorBody {
    /// `true` when the backend says the refresh credential itself is no
    /// longer valid (revoked, expired, or never issued).
    pub fn is_invalid_grant(&self) -> bool {
        self.error == "invalid_grant"
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {desc}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

// ---------------------------------------------------------------------------
// Sign-in and current user
// ---------------------------------------------------------------------------

/// Email/password pair posted to the sign-in endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The signed-in user as reported by the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The instant `secs` seconds after the unix epoch, or `None` if that is
/// past what [`SystemTime`] can represent.
pub fn from_unix_seconds(secs: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

/// Seconds since the unix epoch, saturating at zero for pre-epoch times.
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
