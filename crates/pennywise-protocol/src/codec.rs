//! Codec trait and the JSON implementation.
//!
//! The auth endpoints speak JSON today, but the transport and the durable
//! token file only depend on the [`Codec`] trait, so a different encoding
//! can be slotted in without touching them.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts auth payloads to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` for malformed or mismatched input.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use pennywise_protocol::{Codec, JsonCodec, TokenResponse};
///
/// let body = br#"{"accessToken":"abc","expiresAt":1700000000}"#;
/// let resp: TokenResponse = JsonCodec.decode(body).unwrap();
/// assert_eq!(resp.access_token, "abc");
/// assert_eq!(resp.expires_at, Some(1_700_000_000));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Credentials, ErrorBody, TokenResponse};

    #[test]
    fn test_decode_token_response_without_expiry() {
        let resp: TokenResponse =
            JsonCodec.decode(br#"{"accessToken":"tok"}"#).unwrap();
        assert_eq!(resp.access_token, "tok");
        assert_eq!(resp.expires_at, None);
        assert_eq!(resp.expires_in, None);
    }

    #[test]
    fn test_decode_token_response_missing_token_fails() {
        let result: Result<TokenResponse, _> =
            JsonCodec.decode(br#"{"expiresAt":5}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_error_body_with_description() {
        let body: ErrorBody = JsonCodec
            .decode(br#"{"error":"invalid_grant","error_description":"revoked"}"#)
            .unwrap();
        assert!(body.is_invalid_grant());
        assert_eq!(body.error_description.as_deref(), Some("revoked"));
    }

    #[test]
    fn test_encode_credentials_uses_plain_field_names() {
        let creds = Credentials::new("ada@example.com", "hunter2");
        let bytes = JsonCodec.encode(&creds).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["password"], "hunter2");
    }
}
