//! `AuthSession`: the explicitly constructed session context.
//!
//! Owns one token store, one breaker, one coordinator and one validator,
//! wired to the same clock and event bus. Cheap to clone; every clone
//! talks to the same session.

use std::sync::Arc;
use std::time::SystemTime;

use pennywise_protocol::{AccessToken, Credentials};
use pennywise_transport::{AuthTransport, RefreshFailure};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    AuthEvent, CircuitBreaker, ClearReason, Clock, EventBus, FailureState, MemorySideChannel,
    RefreshCoordinator, SessionConfig, SessionError, SessionState, SessionValidator, SideChannel,
    SystemClock, TokenStore,
};

/// Read-only view of the session for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub has_token: bool,
    pub expires_at: Option<SystemTime>,
    pub refresh_in_flight: bool,
    pub failures: FailureState,
    pub refresh_calls: u64,
    pub generation: u64,
}

/// Builder for [`AuthSession`].
///
/// # Example
///
/// ```rust,ignore
/// let session = AuthSession::builder(HttpAuthTransport::new(url)?)
///     .config(SessionConfig::default())
///     .side_channel(JsonFileSideChannel::new("token.json"))
///     .build();
/// ```
pub struct AuthSessionBuilder<T: AuthTransport> {
    transport: T,
    config: SessionConfig,
    side_channel: Box<dyn SideChannel>,
    clock: Arc<dyn Clock>,
}

impl<T: AuthTransport> AuthSessionBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: SessionConfig::default(),
            side_channel: Box::new(MemorySideChannel::default()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Where the token is mirrored. Defaults to memory only.
    pub fn side_channel(mut self, side_channel: impl SideChannel) -> Self {
        self.side_channel = Box::new(side_channel);
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> AuthSession<T> {
        let config = self.config.validated();
        let events = EventBus::new(config.event_capacity);
        let store = Arc::new(TokenStore::from_boxed(self.side_channel));
        let breaker = Arc::new(CircuitBreaker::new(
            config.failure_threshold,
            config.cooldown,
            config.cooldown_policy,
            Arc::clone(&self.clock),
            events.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            self.transport,
            Arc::clone(&store),
            Arc::clone(&breaker),
            events.clone(),
            config.refresh_timeout,
        );
        let validator = SessionValidator::new(
            Arc::clone(&store),
            Arc::clone(&breaker),
            coordinator.clone(),
            Arc::clone(&self.clock),
            config.lead_time,
        );

        AuthSession {
            inner: Arc::new(SessionInner {
                config,
                store,
                breaker,
                coordinator,
                validator,
                events,
            }),
        }
    }
}

struct SessionInner<T: AuthTransport> {
    config: SessionConfig,
    store: Arc<TokenStore>,
    breaker: Arc<CircuitBreaker>,
    coordinator: RefreshCoordinator<T>,
    validator: SessionValidator<T>,
    events: EventBus,
}

/// One user's authentication session.
pub struct AuthSession<T: AuthTransport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: AuthTransport> Clone for AuthSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AuthTransport> AuthSession<T> {
    pub fn builder(transport: T) -> AuthSessionBuilder<T> {
        AuthSessionBuilder::new(transport)
    }

    /// A session with default config, memory storage and the system clock.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    pub fn coordinator(&self) -> &RefreshCoordinator<T> {
        &self.inner.coordinator
    }

    pub fn validator(&self) -> &SessionValidator<T> {
        &self.inner.validator
    }

    pub fn transport(&self) -> &T {
        self.inner.coordinator.transport()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.store.access_token()
    }

    pub fn state(&self) -> SessionState {
        self.inner.validator.state()
    }

    pub fn is_token_expired_or_expiring(&self) -> bool {
        self.inner.validator.is_token_expired_or_expiring()
    }

    pub async fn ensure_valid_session(&self) -> bool {
        self.inner.validator.ensure_valid_session().await
    }

    pub async fn check_session(&self) -> Result<AccessToken, SessionError> {
        self.inner.validator.check_session().await
    }

    pub async fn refresh(&self) -> bool {
        self.inner.coordinator.refresh().await
    }

    /// Signs in and stores the first access token.
    ///
    /// A successful sign-in also resets the breaker. Sign-in failures are
    /// the user's to retry and don't count against it.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let call = self.transport().sign_in(credentials);
        let grant = match tokio::time::timeout(self.inner.config.refresh_timeout, call).await {
            Ok(Ok(grant)) => grant,
            Ok(Err(failure)) => {
                warn!(kind = failure.kind(), error = %failure, "sign-in failed");
                return Err(SessionError::SignIn(failure));
            }
            Err(_) => {
                warn!("sign-in timed out");
                return Err(SessionError::SignIn(RefreshFailure::Timeout));
            }
        };

        self.inner
            .store
            .set_access_token(grant.access_token, grant.expires_at);
        self.inner.breaker.record_success();
        info!("signed in");
        self.inner.events.emit(AuthEvent::SignedIn);
        Ok(())
    }

    /// Signs out.
    ///
    /// Local state goes first, so a refresh that is still on the wire can't
    /// resurrect the session. The backend is told afterwards; if that call
    /// fails the user is signed out locally anyway.
    pub async fn sign_out(&self) {
        let token = self.inner.store.access_token();
        self.clear(ClearReason::SignOut);

        let call = self.transport().sign_out(token.as_ref());
        match tokio::time::timeout(self.inner.config.refresh_timeout, call).await {
            Ok(Ok(())) => debug!("backend sign-out acknowledged"),
            Ok(Err(e)) => warn!(error = %e, "backend sign-out failed, signed out locally"),
            Err(_) => warn!("backend sign-out timed out, signed out locally"),
        }
    }

    /// Wipes the token and announces why.
    pub fn clear(&self, reason: ClearReason) {
        self.inner.store.clear();
        info!(%reason, "session cleared");
        self.inner.events.emit(AuthEvent::SessionCleared { reason });
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let tokens = self.inner.store.snapshot();
        SessionSnapshot {
            state: self.state(),
            has_token: tokens.access_token.is_some(),
            expires_at: tokens.expires_at,
            refresh_in_flight: self.inner.coordinator.is_refreshing(),
            failures: self.inner.breaker.failure_state(),
            refresh_calls: self.inner.coordinator.refresh_calls(),
            generation: tokens.generation,
        }
    }
}
