//! Wire protocol for the Pennywise auth endpoints.
//!
//! This crate defines what the client and the hosted backend exchange when
//! a session is created, refreshed, or inspected:
//!
//! - **Types** ([`TokenResponse`], [`TokenGrant`], [`AccessToken`],
//!   [`Credentials`], [`CurrentUser`], [`ErrorBody`]): request and response
//!   bodies of the auth endpoints.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes to types and back.
//! - **JWT helpers** ([`jwt_expiry`]): reads the `exp` claim when the
//!   backend doesn't send an explicit expiry.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about HTTP or about session state. It
//! only describes the shapes on the wire:
//!
//! ```text
//! Transport (HTTP bodies) → Protocol (TokenGrant) → Session (token store)
//! ```

mod codec;
mod error;
mod jwt;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use jwt::jwt_expiry;
pub use types::{
    AccessToken, Credentials, CurrentUser, ErrorBody, TokenGrant,
    TokenResponse, from_unix_seconds, unix_seconds,
};
