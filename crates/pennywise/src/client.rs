//! `ApiClient`: authenticated JSON calls against the Pennywise backend.

use pennywise_protocol::{AccessToken, CurrentUser};
use pennywise_session::AuthSession;
use pennywise_transport::{AuthTransport, HttpAuthTransport, TransportError};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{PennywiseError, RequestInterceptor, ResponseAction, RetryMarker};

/// Path of the current-user endpoint.
pub const CURRENT_USER_PATH: &str = "/api/auth/me";

/// One logical API request. Resent as-is after a recovered 401.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, starting with `/`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self, PennywiseError> {
        let body = serde_json::to_value(body).map_err(pennywise_protocol::ProtocolError::Encode)?;
        Ok(Self {
            body: Some(body),
            ..Self::new(Method::POST, path)
        })
    }
}

/// HTTP client that runs every request through the [`RequestInterceptor`].
pub struct ApiClient<T: AuthTransport = HttpAuthTransport> {
    http: reqwest::Client,
    base_url: String,
    interceptor: RequestInterceptor<T>,
}

impl<T: AuthTransport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            interceptor: self.interceptor.clone(),
        }
    }
}

impl ApiClient<HttpAuthTransport> {
    /// Shares the transport's HTTP client (and cookie jar) and base URL.
    pub fn new(session: AuthSession<HttpAuthTransport>) -> Self {
        let http = session.transport().client().clone();
        let base_url = session.transport().base_url().to_string();
        Self::with_client(http, base_url, session)
    }
}

impl<T: AuthTransport> ApiClient<T> {
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, session: AuthSession<T>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            interceptor: RequestInterceptor::new(session),
        }
    }

    pub fn session(&self) -> &AuthSession<T> {
        self.interceptor.session()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `request`, recovering from one 401 at most.
    ///
    /// Returns the response for any status other than an unrecoverable
    /// 401; callers decide what other statuses mean.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, PennywiseError> {
        let mut token = self.interceptor.before_request().await.into_result()?;
        let mut marker = RetryMarker::new();
        loop {
            let response = self.dispatch(request, &token).await?;
            let status = response.status().as_u16();
            match self.interceptor.after_response(status, &token, &mut marker).await {
                ResponseAction::PassThrough => return Ok(response),
                ResponseAction::Resend { token: fresh } => {
                    debug!(method = %request.method, path = %request.path, "resending after refresh");
                    token = fresh;
                }
                ResponseAction::Fail(err) => return Err(err.into()),
            }
        }
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, PennywiseError> {
        let response = self.send(&ApiRequest::get(path)).await?;
        read_json(response).await
    }

    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, PennywiseError> {
        let response = self.send(&ApiRequest::post(path, body)?).await?;
        read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), PennywiseError> {
        let response = self.send(&ApiRequest::delete(path)).await?;
        ensure_success(response).await.map(drop)
    }

    /// The signed-in user.
    pub async fn current_user(&self) -> Result<CurrentUser, PennywiseError> {
        self.get_json(CURRENT_USER_PATH).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: &AccessToken,
    ) -> Result<reqwest::Response, PennywiseError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(token.as_str());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(TransportError::from)?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            "api response"
        );
        Ok(response)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, PennywiseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PennywiseError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, PennywiseError> {
    let response = ensure_success(response).await?;
    Ok(response.json().await.map_err(TransportError::from)?)
}
