//! HTTP transport using `reqwest`.

use std::time::{Duration, SystemTime};

use pennywise_protocol::{
    AccessToken, Codec, Credentials, ErrorBody, JsonCodec, TokenGrant, TokenResponse,
};

use crate::{AuthTransport, RefreshFailure, TransportError};

/// Paths of the auth endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub refresh: String,
    pub sign_in: String,
    pub sign_out: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            refresh: "/api/auth/refresh".into(),
            sign_in: "/api/auth/login".into(),
            sign_out: "/api/auth/logout".into(),
        }
    }
}

/// An [`AuthTransport`] that speaks JSON over HTTP.
///
/// The underlying client keeps a cookie store: the sign-in response sets
/// the refresh credential cookie, and every later refresh sends it back.
/// Share [`client()`](Self::client) with other HTTP callers that need the
/// same cookies.
#[derive(Debug, Clone)]
pub struct HttpAuthTransport {
    client: reqwest::Client,
    base_url: String,
    endpoints: AuthEndpoints,
}

impl HttpAuthTransport {
    /// Creates a transport for `base_url` with a fresh cookie-enabled client.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Creates a transport around an existing client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            endpoints: AuthEndpoints::default(),
        })
    }

    /// Overrides the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The shared HTTP client (and its cookie jar).
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn token_call(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<TokenGrant, RefreshFailure> {
        let resp = request.send().await.map_err(map_send_error)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        let token: TokenResponse = JsonCodec.decode(&body)?;
        Ok(token.into_grant(SystemTime::now())?)
    }
}

impl AuthTransport for HttpAuthTransport {
    async fn refresh(&self) -> Result<TokenGrant, RefreshFailure> {
        tracing::debug!(endpoint = %self.endpoints.refresh, "refreshing access token");
        self.token_call(self.client.post(self.url(&self.endpoints.refresh)))
            .await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenGrant, RefreshFailure> {
        tracing::debug!(email = %credentials.email, "signing in");
        self.token_call(
            self.client
                .post(self.url(&self.endpoints.sign_in))
                .json(credentials),
        )
        .await
    }

    async fn sign_out(&self, token: Option<&AccessToken>) -> Result<(), TransportError> {
        let mut request = self.client.post(self.url(&self.endpoints.sign_out));
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }
        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(resp.status().as_u16()))
        }
    }
}

/// Maps a non-2xx auth endpoint response to a [`RefreshFailure`].
///
/// 401 and 403 always reject the credential. A 400 rejects it only when the
/// body says `invalid_grant`; any other status is a transient server failure.
pub fn classify_failure(status: u16, body: &[u8]) -> RefreshFailure {
    let parsed: Option<ErrorBody> = JsonCodec.decode(body).ok();
    match status {
        401 | 403 => RefreshFailure::Rejected(
            parsed
                .map(|b| b.to_string())
                .unwrap_or_else(|| format!("HTTP {status}")),
        ),
        400 => match parsed {
            Some(b) if b.is_invalid_grant() => RefreshFailure::Rejected(b.to_string()),
            _ => RefreshFailure::Server { status },
        },
        _ => RefreshFailure::Server { status },
    }
}

fn map_send_error(err: reqwest::Error) -> RefreshFailure {
    if err.is_timeout() {
        RefreshFailure::Timeout
    } else {
        RefreshFailure::Network(err.to_string())
    }
}
