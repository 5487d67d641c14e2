//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding auth payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of a request body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The response body was not valid JSON or didn't match the expected
    /// shape (missing `accessToken`, wrong field types, truncated body).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload parsed but carries values the client can't use,
    /// such as an empty access token.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
