//! Request interceptor: the hooks an HTTP client runs around every call.
//!
//! ```text
//! before_request() ── session usable? ── yes → attach bearer token, send
//!                                      └─ no  → clear session, don't send
//!
//! after_response(status, sent, marker)
//!   non-401                          → PassThrough
//!   401, marker set                  → Fail(Unauthorized)
//!   401, store holds a newer token   → set marker, Resend { newer }
//!   401, credential rejected before  → Fail(ReauthRequired), no refresh
//!   401, otherwise                   → set marker, refresh → Resend { token } | Fail
//! ```
//!
//! `sent` is the token the request went out with. When several requests
//! go stale together, the first 401 refreshes and the others pick up the
//! new token from the store instead of refreshing again.
//!
//! The marker belongs to one logical request, so two identical requests in
//! flight at the same time each get their own recovery attempt.

use pennywise_protocol::AccessToken;
use pennywise_session::{AuthEvent, AuthSession, ClearReason, RefreshOutcome};
use pennywise_transport::AuthTransport;
use tracing::{debug, info};

use crate::AuthError;

/// Answer of the pre-request hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreRequest {
    /// Whether the request may be sent.
    pub proceed: bool,
    /// Bearer token to attach when proceeding.
    pub token: Option<AccessToken>,
    /// Why the request was stopped.
    pub denied: Option<AuthError>,
}

impl PreRequest {
    fn allow(token: AccessToken) -> Self {
        Self {
            proceed: true,
            token: Some(token),
            denied: None,
        }
    }

    fn deny(err: AuthError) -> Self {
        Self {
            proceed: false,
            token: None,
            denied: Some(err),
        }
    }

    /// The token to send, or the reason not to send.
    pub fn into_result(self) -> Result<AccessToken, AuthError> {
        match (self.proceed, self.token, self.denied) {
            (true, Some(token), _) => Ok(token),
            (_, _, Some(err)) => Err(err),
            _ => Err(AuthError::ReauthRequired {
                reason: "no access token".into(),
            }),
        }
    }
}

/// "This request already went through one recovery cycle."
///
/// Create one per logical request, before the first send; drop it when the
/// request settles.
#[derive(Debug, Default)]
pub struct RetryMarker {
    retried: bool,
}

impl RetryMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.retried
    }
}

/// What to do with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    /// Hand the response to the caller.
    PassThrough,
    /// Send the same request again with this token.
    Resend { token: AccessToken },
    /// Give up with this error.
    Fail(AuthError),
}

/// Runs the session checks for an HTTP client.
pub struct RequestInterceptor<T: AuthTransport> {
    session: AuthSession<T>,
}

impl<T: AuthTransport> Clone for RequestInterceptor<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<T: AuthTransport> RequestInterceptor<T> {
    pub fn new(session: AuthSession<T>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &AuthSession<T> {
        &self.session
    }

    /// Makes sure the session is usable before a request is sent.
    ///
    /// On failure the session is cleared and the request must not be sent.
    pub async fn before_request(&self) -> PreRequest {
        match self.session.check_session().await {
            Ok(token) => PreRequest::allow(token),
            Err(err) => {
                let err = AuthError::from(err);
                debug!(error = %err, "request blocked before send");
                self.give_up(ClearReason::SessionInvalid, &err);
                PreRequest::deny(err)
            }
        }
    }

    /// Decides what to do with a response to a request sent with `sent`.
    pub async fn after_response(
        &self,
        status: u16,
        sent: &AccessToken,
        marker: &mut RetryMarker,
    ) -> ResponseAction {
        if status != 401 {
            return ResponseAction::PassThrough;
        }
        if marker.retried {
            info!("request unauthorized after refresh, giving up");
            let err = AuthError::Unauthorized;
            self.give_up(ClearReason::Unauthorized, &err);
            return ResponseAction::Fail(err);
        }
        marker.retried = true;

        match self.session.access_token() {
            Some(current) if current != *sent => {
                debug!("401 on a superseded token, resending with the current one");
                return ResponseAction::Resend { token: current };
            }
            _ => {}
        }
        if let Some(reason) = self.session.store().rejected_credential() {
            let err = AuthError::ReauthRequired { reason };
            self.give_up(ClearReason::SessionInvalid, &err);
            return ResponseAction::Fail(err);
        }

        debug!("401 received, refreshing before resend");
        let outcome = self.session.coordinator().refresh_outcome().await;
        let err = match outcome {
            RefreshOutcome::Refreshed { .. } => match self.session.access_token() {
                Some(token) => return ResponseAction::Resend { token },
                None => AuthError::ReauthRequired {
                    reason: "session cleared".into(),
                },
            },
            RefreshOutcome::CircuitOpen => AuthError::CircuitOpen {
                retry_after: self.session.breaker().retry_after().unwrap_or_default(),
            },
            RefreshOutcome::Discarded => AuthError::ReauthRequired {
                reason: "session cleared during refresh".into(),
            },
            RefreshOutcome::Failed(failure) => AuthError::ReauthRequired {
                reason: failure.to_string(),
            },
        };
        self.give_up(ClearReason::SessionInvalid, &err);
        ResponseAction::Fail(err)
    }

    fn give_up(&self, reason: ClearReason, err: &AuthError) {
        self.session.clear(reason);
        if err.requires_login() {
            self.session
                .events()
                .emit(AuthEvent::LoginRequired { reason });
        }
    }
}
