//! Minimal JWT inspection.
//!
//! The client never validates signatures (that's the backend's job); it only
//! peeks at the payload's `exp` claim to know when a token stops working.

use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Deserialize)]
struct ExpClaim {
    exp: Option<u64>,
}

/// Reads the `exp` claim of a JWT, if the token is one.
///
/// Returns `None` for opaque tokens, malformed payloads, payloads
/// without `exp`, or an `exp` too far out to represent.
pub fn jwt_expiry(token: &str) -> Option<SystemTime> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    // Some issuers pad their segments even though RFC 7515 says not to.
    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claim: ExpClaim = serde_json::from_slice(&bytes).ok()?;
    claim.exp.and_then(crate::from_unix_seconds)
}
