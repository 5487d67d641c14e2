//! Session events.
//!
//! The coordinator, the breaker, and the context object publish what they
//! do on a broadcast channel. Diagnostics views and the UI's "go to login"
//! redirect subscribe instead of polling internal fields.

use std::fmt;
use std::time::SystemTime;

use pennywise_transport::RefreshFailure;
use tokio::sync::broadcast;

/// Why the token store was wiped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The user signed out.
    SignOut,
    /// The backend rejected the refresh credential.
    RefreshRejected,
    /// A request could not get a valid session before being sent.
    SessionInvalid,
    /// A request was still unauthorized after its one recovery attempt.
    Unauthorized,
}

impl fmt::Display for ClearReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignOut => write!(f, "sign-out"),
            Self::RefreshRejected => write!(f, "refresh rejected"),
            Self::SessionInvalid => write!(f, "session invalid"),
            Self::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A refresh network call started. `attempt` is the in-flight handle id.
    RefreshStarted { attempt: u64 },
    RefreshSucceeded { expires_at: Option<SystemTime> },
    RefreshFailed {
        failure: RefreshFailure,
        consecutive_failures: u32,
    },
    /// A refresh finished after the session was cleared; its token was dropped.
    RefreshDiscarded,
    CircuitOpened {
        until: SystemTime,
        consecutive_failures: u32,
    },
    CircuitClosed,
    SessionCleared { reason: ClearReason },
    /// The application should send the user to the login entry point.
    LoginRequired { reason: ClearReason },
    SignedIn,
}

/// Fan-out of [`AuthEvent`]s.
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers see `RecvError::Lagged` rather than
/// holding up the session.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: AuthEvent) {
        tracing::trace!(?event, "auth event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(AuthEvent::CircuitClosed);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.emit(AuthEvent::RefreshStarted { attempt: 1 });
        bus.emit(AuthEvent::RefreshDiscarded);

        assert_eq!(rx.recv().await.unwrap(), AuthEvent::RefreshStarted { attempt: 1 });
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::RefreshDiscarded);
    }

    #[test]
    fn test_clear_reason_display() {
        assert_eq!(ClearReason::SignOut.to_string(), "sign-out");
        assert_eq!(ClearReason::RefreshRejected.to_string(), "refresh rejected");
    }
}
