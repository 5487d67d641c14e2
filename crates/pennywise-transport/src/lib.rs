//! Transport abstraction for the Pennywise auth endpoints.
//!
//! The session layer never talks HTTP directly. It goes through
//! [`AuthTransport`], which has three calls: exchange the ambient refresh
//! credential for a new access token, sign in with credentials, and tell
//! the backend the user signed out.
//!
//! Refresh calls made through this trait are never routed through the
//! request interceptor, so they can't recurse into session validation.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpAuthTransport`] via `reqwest`, with a cookie
//!   store carrying the refresh credential.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::{RefreshFailure, TransportError};
#[cfg(feature = "http")]
pub use http::{AuthEndpoints, HttpAuthTransport, classify_failure};

use pennywise_protocol::{AccessToken, Credentials, TokenGrant};

/// Talks to the backend's auth endpoints.
///
/// Implementations must be cheap to call concurrently; the session layer
/// guarantees at most one `refresh` is outstanding at a time but sign-in
/// and sign-out may overlap with it.
pub trait AuthTransport: Send + Sync + 'static {
    /// Exchanges the refresh credential for a fresh access token.
    ///
    /// The credential travels by an ambient mechanism (a cookie), so no
    /// argument is needed.
    fn refresh(
        &self,
    ) -> impl std::future::Future<Output = Result<TokenGrant, RefreshFailure>> + Send;

    /// Signs in with email and password, establishing a new refresh
    /// credential and returning the first access token.
    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<TokenGrant, RefreshFailure>> + Send;

    /// Asks the backend to invalidate the refresh credential.
    ///
    /// Callers treat this as best-effort.
    fn sign_out(
        &self,
        token: Option<&AccessToken>,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
