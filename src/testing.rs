//! Router-level test helpers backed by the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::auth::SESSION_COOKIE;
use crate::store::{MemoryStore, Stores};
use crate::token::TokenService;
use crate::{app, AppState};

pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let state = AppState {
        tokens: Arc::new(TokenService::new(b"test-secret-key-12345")),
        stores: Stores::from_backend(store.clone()),
        secure_cookies: false,
    };
    Harness {
        app: app(state.clone()),
        state,
        store,
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
    }
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

/// The session token set by a `Set-Cookie` response header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.get(SET_COOKIE)?.to_str().ok()?;
    let pair = cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
}

/// Registers a fresh account and returns its session token.
pub async fn login(h: &Harness) -> String {
    let body = json!({ "email": "office@example.com", "password": "correct horse" });
    let (status, headers, _) = send(&h.app, Method::POST, "/auth/register", Some(body), None).await;
    assert_eq!(status, StatusCode::CREATED);
    session_token(&headers).unwrap()
}
