//! Client-side session coordination for Pennywise.
//!
//! This crate keeps a bearer token usable for the lifetime of the client:
//!
//! 1. **Token store**: the current access token and its expiry, mirrored
//!    to a durable [`SideChannel`] ([`TokenStore`])
//! 2. **Refresh coordinator**: at most one refresh on the wire, its
//!    outcome shared by every caller ([`RefreshCoordinator`])
//! 3. **Circuit breaker**: fail fast after repeated refresh failures,
//!    then admit one probe ([`CircuitBreaker`])
//! 4. **Session validator**: classifies the session and refreshes it
//!    when a request needs it ([`SessionValidator`])
//!
//! [`AuthSession`] wires the four together around one clock and one
//! [`EventBus`].
//!
//! # How it fits in the stack
//!
//! ```text
//! API client (above)   ← asks for a usable token before every request
//!     ↕
//! Session (this crate) ← decides when to refresh, and whether it may
//!     ↕
//! Transport (below)    ← talks to the auth endpoints
//! ```

#![allow(async_fn_in_trait)]

mod breaker;
mod clock;
mod config;
mod context;
mod coordinator;
mod error;
mod events;
mod store;
mod validator;

pub use breaker::{CircuitBreaker, CooldownPolicy, FailureState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use context::{AuthSession, AuthSessionBuilder, SessionSnapshot};
pub use coordinator::{InFlightRefresh, RefreshCoordinator, RefreshOutcome};
pub use error::SessionError;
pub use events::{AuthEvent, ClearReason, EventBus};
pub use store::{
    JsonFileSideChannel, MemorySideChannel, SideChannel, StoredToken, TokenSnapshot, TokenStore,
};
pub use validator::{SessionState, SessionValidator, classify};
