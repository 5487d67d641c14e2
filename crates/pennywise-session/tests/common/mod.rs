//! Scripted in-memory transport shared by the session integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use pennywise_protocol::{AccessToken, Credentials, TokenGrant};
use pennywise_session::{AuthEvent, AuthSession, ManualClock, SessionConfig};
use pennywise_transport::{AuthTransport, RefreshFailure, TransportError};
use tokio::sync::{Semaphore, broadcast};

pub const START: u64 = 1_700_000_000;

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

pub fn grant(token: &str, expires_at: u64) -> TokenGrant {
    TokenGrant::new(token, Some(at(expires_at)))
}

/// Answers refreshes from a queue. An empty queue answers with a network
/// failure. While gated, refreshes wait for [`release`](Self::release).
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Script>,
}

#[derive(Default)]
struct Script {
    refreshes: Mutex<VecDeque<Result<TokenGrant, RefreshFailure>>>,
    sign_in: Mutex<Option<Result<TokenGrant, RefreshFailure>>>,
    sign_out_fails: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_refresh(&self, result: Result<TokenGrant, RefreshFailure>) -> &Self {
        self.inner.refreshes.lock().push_back(result);
        self
    }

    pub fn set_sign_in(&self, result: Result<TokenGrant, RefreshFailure>) {
        *self.inner.sign_in.lock() = Some(result);
    }

    pub fn fail_sign_out(&self) {
        self.inner.sign_out_fails.store(true, Ordering::SeqCst);
    }

    /// Holds every refresh until released.
    pub fn gate(&self) {
        *self.inner.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.inner.gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.inner.sign_out_calls.load(Ordering::SeqCst)
    }
}

impl AuthTransport for ScriptedTransport {
    async fn refresh(&self) -> Result<TokenGrant, RefreshFailure> {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.inner.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let next = self.inner.refreshes.lock().pop_front();
        next.unwrap_or_else(|| Err(RefreshFailure::Network("script exhausted".into())))
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<TokenGrant, RefreshFailure> {
        let scripted = self.inner.sign_in.lock().clone();
        scripted.unwrap_or_else(|| Ok(TokenGrant::new("signed-in", None)))
    }

    async fn sign_out(&self, _token: Option<&AccessToken>) -> Result<(), TransportError> {
        self.inner.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.sign_out_fails.load(Ordering::SeqCst) {
            Err(TransportError::Status(500))
        } else {
            Ok(())
        }
    }
}

pub fn session(transport: &ScriptedTransport, clock: &ManualClock) -> AuthSession<ScriptedTransport> {
    session_with(transport, clock, SessionConfig::default())
}

pub fn session_with(
    transport: &ScriptedTransport,
    clock: &ManualClock,
    config: SessionConfig,
) -> AuthSession<ScriptedTransport> {
    AuthSession::builder(transport.clone())
        .config(config)
        .clock(clock.clone())
        .build()
}

/// Everything emitted so far.
pub fn drain(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<AuthEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Lets spawned tasks run until `done` holds.
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held");
}
