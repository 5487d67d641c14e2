//! Integration tests for `ApiClient` against a mock backend.
//!
//! The backend runs on axum at 127.0.0.1:0 and behaves like the real one:
//! sign-in sets a refresh cookie, refresh rotates the access token, and
//! data routes answer 401 to any bearer token but the current one.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use parking_lot::Mutex;
use pennywise::prelude::*;
use serde_json::{Value, json};

// =========================================================================
// Mock backend
// =========================================================================

#[derive(Default)]
struct Backend {
    current: Mutex<String>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    data_hits: AtomicUsize,
    logouts: AtomicUsize,
    refresh_unavailable: Mutex<bool>,
}

impl Backend {
    fn issue(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("a{n}");
        *self.current.lock() = token.clone();
        token
    }

    /// Invalidates the access token the client holds, as if it had expired
    /// server-side. The refresh cookie stays valid.
    fn rotate_away(&self) {
        *self.current.lock() = "rotated".into();
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.current.lock());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn data_hits(&self) -> usize {
        self.data_hits.load(Ordering::SeqCst)
    }
}

type Shared = Arc<Backend>;

async fn login(State(backend): State<Shared>) -> Response {
    let token = backend.issue();
    (
        [(header::SET_COOKIE, "pw_refresh=r1; Path=/; HttpOnly")],
        axum::Json(json!({ "accessToken": token, "expiresIn": 3600 })),
    )
        .into_response()
}

async fn refresh(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if *backend.refresh_unavailable.lock() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("pw_refresh=r1"));
    if !has_cookie {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "no_session" })),
        )
            .into_response();
    }
    let token = backend.issue();
    axum::Json(json!({ "accessToken": token, "expiresIn": 3600 })).into_response()
}

async fn logout(State(backend): State<Shared>) -> StatusCode {
    backend.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn me(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    axum::Json(json!({ "id": "u1", "email": "ada@example.com" })).into_response()
}

async fn accounts(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    backend.data_hits.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    axum::Json(json!([{ "id": 1, "name": "Checking" }])).into_response()
}

async fn always_unauthorized(State(backend): State<Shared>) -> StatusCode {
    backend.data_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn create_transaction(
    State(backend): State<Shared>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (
        StatusCode::CREATED,
        axum::Json(json!({ "id": 7, "amount": body["amount"] })),
    )
        .into_response()
}

async fn delete_transaction(State(backend): State<Shared>, headers: HeaderMap) -> StatusCode {
    if !backend.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    StatusCode::NO_CONTENT
}

/// Serves the mock backend on 127.0.0.1 with an OS-assigned port.
async fn serve() -> (String, Shared) {
    let backend = Shared::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/accounts", get(accounts))
        .route("/api/always-401", get(always_unauthorized))
        .route("/api/transactions", post(create_transaction))
        .route("/api/transactions/7", delete(delete_transaction))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = listener.local_addr().expect("should have addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), backend)
}

fn client(base: &str) -> ApiClient {
    let transport = HttpAuthTransport::new(base).expect("valid base url");
    ApiClient::new(AuthSession::new(transport))
}

async fn signed_in(base: &str) -> ApiClient {
    let api = client(base);
    api.session()
        .sign_in(&Credentials::new("ada@example.com", "hunter2"))
        .await
        .expect("sign-in should succeed");
    api
}

fn auth_error(result: Result<impl std::fmt::Debug, PennywiseError>) -> AuthError {
    match result {
        Err(PennywiseError::Auth(err)) => err,
        other => panic!("expected an auth error, got {other:?}"),
    }
}

// =========================================================================
// Happy path
// =========================================================================

#[tokio::test]
async fn test_current_user_after_sign_in_uses_bearer_token() {
    let (base, backend) = serve().await;
    let api = signed_in(&base).await;

    let user = api.current_user().await.unwrap();

    assert_eq!(user.id, "u1");
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_post_json_and_delete_round_trip() {
    let (base, _backend) = serve().await;
    let api = signed_in(&base).await;

    let created: Value = api
        .post_json("/api/transactions", &json!({ "amount": -1250 }))
        .await
        .unwrap();
    api.delete("/api/transactions/7").await.unwrap();

    assert_eq!(created, json!({ "id": 7, "amount": -1250 }));
}

#[tokio::test]
async fn test_non_auth_error_status_is_returned_as_api_error() {
    let (base, _backend) = serve().await;
    let api = signed_in(&base).await;

    let result: Result<Value, _> = api.get_json("/api/does-not-exist").await;

    assert!(matches!(result, Err(PennywiseError::Api { status: 404, .. })));
    assert!(api.session().access_token().is_some());
}

// =========================================================================
// 401 recovery
// =========================================================================

#[tokio::test]
async fn test_401_refreshes_and_resends_once() {
    let (base, backend) = serve().await;
    let api = signed_in(&base).await;
    backend.rotate_away();

    let accounts: Vec<Value> = api.get_json("/api/accounts").await.unwrap();

    assert_eq!(accounts.len(), 1);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.data_hits(), 2);
    assert_eq!(
        api.session().access_token(),
        Some(AccessToken::new("a2"))
    );
}

#[tokio::test]
async fn test_second_401_is_not_resent_again() {
    let (base, backend) = serve().await;
    let api = signed_in(&base).await;
    let mut events = api.session().subscribe();

    let err = auth_error(api.send(&ApiRequest::get("/api/always-401")).await);

    assert_eq!(err, AuthError::Unauthorized);
    assert!(err.requires_login());
    assert_eq!(backend.data_hits(), 2);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(api.session().access_token(), None);

    let mut saw_login_required = false;
    while let Ok(event) = events.try_recv() {
        if event
            == (AuthEvent::LoginRequired {
                reason: ClearReason::Unauthorized,
            })
        {
            saw_login_required = true;
        }
    }
    assert!(saw_login_required);
}

// =========================================================================
// Pre-request failures
// =========================================================================

#[tokio::test]
async fn test_request_without_session_is_not_sent() {
    let (base, backend) = serve().await;
    let api = client(&base);

    let err = auth_error(api.get_json::<Value>("/api/accounts").await);

    assert!(matches!(err, AuthError::ReauthRequired { .. }));
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.data_hits(), 0);
}

#[tokio::test]
async fn test_refresh_outage_opens_breaker_then_fails_fast() {
    let (base, backend) = serve().await;
    let api = signed_in(&base).await;
    *backend.refresh_unavailable.lock() = true;

    for _ in 0..3 {
        api.session().clear(ClearReason::SessionInvalid);
        let err = auth_error(api.get_json::<Value>("/api/accounts").await);
        assert!(matches!(err, AuthError::ReauthRequired { .. }), "{err:?}");
    }

    let err = auth_error(api.get_json::<Value>("/api/accounts").await);

    assert!(matches!(err, AuthError::CircuitOpen { .. }), "{err:?}");
    assert!(!err.requires_login());
    assert_eq!(backend.refresh_calls(), 3);
    assert_eq!(backend.data_hits(), 0);
}

// =========================================================================
// Sign-out
// =========================================================================

#[tokio::test]
async fn test_sign_out_clears_session_and_notifies_backend() {
    let (base, backend) = serve().await;
    let api = signed_in(&base).await;

    api.session().sign_out().await;

    assert_eq!(api.session().access_token(), None);
    assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
}
