//! # Pennywise
//!
//! Authenticated client for the Pennywise personal finance backend.
//!
//! The backend hands out short-lived bearer tokens. This crate keeps one
//! usable for the lifetime of the client: it refreshes ahead of expiry,
//! collapses concurrent refreshes into one call, recovers from a 401 once
//! per request, and stops hammering the auth service when it is failing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pennywise::prelude::*;
//!
//! # async fn run() -> Result<(), PennywiseError> {
//! let config = ClientConfig::from_env()?;
//! let session = config.build_session()?;
//! session.sign_in(&Credentials::new("ada@example.com", "hunter2")).await?;
//!
//! let _monitor = SessionMonitor::start(session.clone(), &TokioScheduler::new(), config.monitor.clone());
//! let api = ApiClient::new(session);
//! let me = api.current_user().await?;
//! # let _ = me;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `pennywise-protocol`: wire types of the auth endpoints
//! - `pennywise-transport`: [`AuthTransport`](prelude::AuthTransport) and its HTTP implementation
//! - `pennywise-session`: token store, refresh coordinator, circuit breaker, validator
//! - `pennywise-monitor`: periodic and focus-driven checks
//! - this crate: request interceptor, [`ApiClient`], errors, configuration

mod client;
mod config;
mod error;
mod interceptor;

pub use client::{ApiClient, ApiRequest, CURRENT_USER_PATH};
pub use config::{
    ClientConfig, ConfigError, ENV_API_URL, ENV_BREAKER_COOLDOWN_SECS, ENV_BREAKER_THRESHOLD,
    ENV_MONITOR_INTERVAL_SECS, ENV_REFRESH_LEAD_SECS, ENV_REFRESH_TIMEOUT_SECS, ENV_TOKEN_FILE,
};
pub use error::{AuthError, PennywiseError};
pub use interceptor::{PreRequest, RequestInterceptor, ResponseAction, RetryMarker};

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (for example `"pennywise=info"`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{
        ApiClient, ApiRequest, AuthError, ClientConfig, PennywiseError, RequestInterceptor,
        ResponseAction, RetryMarker,
    };
    pub use pennywise_monitor::{
        CancelHandle, CheckOutcome, MonitorConfig, Scheduler, SessionMonitor, TokioScheduler,
    };
    pub use pennywise_protocol::{AccessToken, Credentials, CurrentUser, TokenGrant};
    pub use pennywise_session::{
        AuthEvent, AuthSession, ClearReason, CooldownPolicy, JsonFileSideChannel,
        MemorySideChannel, SessionConfig, SessionError, SessionSnapshot, SessionState,
    };
    pub use pennywise_transport::{AuthTransport, HttpAuthTransport, RefreshFailure};
}
