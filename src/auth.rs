use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::headers::{Cookie, HeaderMapExt};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::post;
use axum::{Extension, Json, Router, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Account;
use crate::store::StoreError;
use crate::token::{AuthResult, Identity, TokenService};
use crate::{with_session, AppState, Error, WithSession};

pub const SESSION_COOKIE: &str = "token";

pub fn routes() -> Router {
    Router::new()
        .route("/auth/register", post(register_account))
        .route("/auth/login", post(login_account))
        .route("/auth/logout", post(logout_account))
}

/// Checks the session cookie. Shared by the route gate and every protected
/// handler.
pub fn ensure_authenticated(cookie: Option<&Cookie>, tokens: &TokenService) -> AuthResult {
    match cookie.and_then(|c| c.get(SESSION_COOKIE)) {
        Some(token) if !token.is_empty() => tokens.verify(token),
        _ => AuthResult::InvalidSession,
    }
}

/// Handler-side check; rejects with 401 before any store access.
pub fn authorize(
    cookie: Option<TypedHeader<Cookie>>,
    tokens: &TokenService,
) -> Result<Identity, Error> {
    let cookie = cookie.map(|TypedHeader(cookie)| cookie);
    match ensure_authenticated(cookie.as_ref(), tokens) {
        AuthResult::Success(identity) => Ok(identity),
        rejected => {
            log::warn!("Rejected protected call: {:?}", rejected);
            Err(Error::unauthorized())
        }
    }
}

/// Route-level gate in front of every protected path. On success the
/// verified [`Identity`] is stored in the request extensions.
pub async fn gate(mut req: Request<Body>, next: Next<Body>) -> Result<Response, Error> {
    let tokens = req
        .extensions()
        .get::<AppState>()
        .map(|state| state.tokens.clone())
        .ok_or_else(|| Error::internal("MissingState", "application state is not installed"))?;

    let cookie = req.headers().typed_get::<Cookie>();
    match ensure_authenticated(cookie.as_ref(), &tokens) {
        AuthResult::Success(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        rejected => {
            log::warn!(
                "Gate rejected {} {}: {:?}",
                req.method(),
                req.uri().path(),
                rejected
            );
            Err(Error::unauthorized())
        }
    }
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        token,
        max_age.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn cleared_cookie(secure: bool) -> String {
    session_cookie("", Duration::zero(), secure)
}

pub async fn hash_password(password: String) -> Result<String, Error> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Pbkdf2.hash_password(password.as_bytes(), &salt)?;
        Ok::<_, pbkdf2::password_hash::Error>(hash.to_string())
    })
    .await??;
    Ok(hash)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, Error> {
    let matches = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)?;
        Ok::<_, pbkdf2::password_hash::Error>(
            Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        )
    })
    .await??;
    Ok(matches)
}

pub async fn register_account(
    Extension(state): Extension<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> WithSession<RegisteredAccount> {
    let Json(credentials) = payload?;
    let (email, password) = credentials.require()?;

    let existing = state.stores.accounts.find_account(&email).await?;
    if existing.is_some() {
        return Err(already_exists());
    }

    let account = Account {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(password).await?,
        created_at: Utc::now(),
    };

    match state.stores.accounts.insert_account(&account).await {
        Ok(()) => {}
        // lost a race against a concurrent registration
        Err(StoreError::Conflict { .. }) => return Err(already_exists()),
        Err(err) => return Err(err.into()),
    }
    log::info!("Registered account {}", account.id);

    let issued = state.tokens.issue(account.id)?;
    with_session(
        StatusCode::CREATED,
        session_cookie(&issued.token, state.tokens.lifetime(), state.secure_cookies),
        RegisteredAccount {
            message: "User registered successfully",
            account_id: account.id,
            email: account.email,
        },
    )
}

pub async fn login_account(
    Extension(state): Extension<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> WithSession<LoggedIn> {
    let Json(credentials) = payload?;
    let (email, password) = match credentials.require() {
        Ok(pair) => pair,
        Err(_) => return Err(Error::invalid_credentials()),
    };

    let account = match state.stores.accounts.find_account(&email).await? {
        Some(account) => account,
        None => {
            log::warn!("Login failed: unknown account");
            return Err(Error::invalid_credentials());
        }
    };
    if !verify_password(password, account.password_hash.clone()).await? {
        log::warn!("Login failed for account {}", account.id);
        return Err(Error::invalid_credentials());
    }

    let issued = state.tokens.issue(account.id)?;
    log::info!("Account {} logged in", account.id);
    with_session(
        StatusCode::OK,
        session_cookie(&issued.token, state.tokens.lifetime(), state.secure_cookies),
        LoggedIn {
            message: "Success",
            account_id: account.id,
            expires_at: issued.expires_at,
        },
    )
}

/// Tells the client to drop its cookie. The token itself stays valid until
/// it expires.
pub async fn logout_account(Extension(state): Extension<AppState>) -> WithSession<LoggedOut> {
    with_session(
        StatusCode::OK,
        cleared_cookie(state.secure_cookies),
        LoggedOut {
            message: "Logged out",
        },
    )
}

fn already_exists() -> Error {
    Error::UserAlreadyExists {
        message: "User already exists".to_string(),
    }
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    /// Normalised email and the password, or the names of missing fields.
    fn require(self) -> Result<(String, String), Error> {
        let email = self
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        let password = self.password.filter(|p| !p.is_empty());

        match (email, password) {
            (Some(email), Some(password)) => Ok((email, password)),
            (email, password) => {
                let mut fields = Vec::new();
                if email.is_none() {
                    fields.push("email".to_string());
                }
                if password.is_none() {
                    fields.push("password".to_string());
                }
                Err(Error::MissingFields {
                    message: "Email and password are required".to_string(),
                    fields,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAccount {
    message: &'static str,
    account_id: Uuid,
    email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    message: &'static str,
    account_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, send, session_token};
    use axum::http::header::SET_COOKIE;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn cookie_carries_session_attributes() {
        let cookie = session_cookie("abc", Duration::days(7), false);
        assert_eq!(
            cookie,
            "token=abc; Path=/; Max-Age=604800; HttpOnly; SameSite=Lax"
        );
        assert!(session_cookie("abc", Duration::days(7), true).ends_with("; Secure"));
        assert!(cleared_cookie(false).starts_with("token=; Path=/; Max-Age=0"));
    }

    #[test]
    fn missing_cookie_is_invalid() {
        let tokens = TokenService::new(b"secret");
        assert_eq!(
            ensure_authenticated(None, &tokens),
            AuthResult::InvalidSession
        );

        let issued = tokens.issue(Uuid::new_v4()).unwrap();
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            format!("theme=dark; {}={}", SESSION_COOKIE, issued.token)
                .parse()
                .unwrap(),
        );
        let cookie = headers.typed_get::<Cookie>();
        assert!(matches!(
            ensure_authenticated(cookie.as_ref(), &tokens),
            AuthResult::Success(_)
        ));
    }

    #[tokio::test]
    async fn hashes_are_salted_and_verifiable() {
        let first = hash_password("hunter22".into()).await.unwrap();
        let second = hash_password("hunter22".into()).await.unwrap();
        assert_ne!(first, second);
        assert!(!first.contains("hunter22"));
        assert!(verify_password("hunter22".into(), first.clone()).await.unwrap());
        assert!(!verify_password("hunter23".into(), first).await.unwrap());
    }

    #[tokio::test]
    async fn register_then_login_yields_verifiable_token() {
        let h = harness();
        let body = json!({ "email": "Clerk@Example.com ", "password": "s3cure-pass" });

        let (status, headers, value) =
            send(&h.app, Method::POST, "/auth/register", Some(body), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(value["email"], "clerk@example.com");
        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));

        let login = json!({ "email": "clerk@example.com", "password": "s3cure-pass" });
        let (status, headers, value) =
            send(&h.app, Method::POST, "/auth/login", Some(login), None).await;
        assert_eq!(status, StatusCode::OK);

        let token = session_token(&headers).unwrap();
        let identity = h.state.tokens.verify(&token).identity().unwrap();
        assert_eq!(identity.account_id.to_string(), value["accountId"]);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let h = harness();
        let body = json!({ "email": "clerk@example.com", "password": "s3cure-pass" });

        let (first, _, _) =
            send(&h.app, Method::POST, "/auth/register", Some(body.clone()), None).await;
        let (second, _, value) =
            send(&h.app, Method::POST, "/auth/register", Some(body), None).await;

        assert_eq!(first, StatusCode::CREATED);
        assert_eq!(second, StatusCode::CONFLICT);
        assert_eq!(value["error"], "UserAlreadyExists");
        assert_eq!(h.store.account_count().await, 1);
    }

    #[tokio::test]
    async fn registration_requires_both_fields() {
        let h = harness();
        let (status, _, value) = send(
            &h.app,
            Method::POST,
            "/auth/register",
            Some(json!({ "email": "clerk@example.com", "password": "" })),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "MissingFields");
        assert_eq!(value["fields"], json!(["password"]));
        assert_eq!(h.store.account_count().await, 0);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let h = harness();
        let body = json!({ "email": "clerk@example.com", "password": "s3cure-pass" });
        send(&h.app, Method::POST, "/auth/register", Some(body), None).await;

        let (wrong_status, wrong_headers, wrong_body) = send(
            &h.app,
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "clerk@example.com", "password": "guess" })),
            None,
        )
        .await;
        let (unknown_status, _, unknown_body) = send(
            &h.app,
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": "guess" })),
            None,
        )
        .await;

        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body, unknown_body);
        assert!(wrong_headers.get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn responses_never_echo_secrets() {
        let h = harness();
        let body = json!({ "email": "clerk@example.com", "password": "s3cure-pass" });
        let (_, _, registered) =
            send(&h.app, Method::POST, "/auth/register", Some(body.clone()), None).await;
        let (_, _, logged_in) = send(&h.app, Method::POST, "/auth/login", Some(body), None).await;

        for value in [registered, logged_in] {
            let text = value.to_string();
            assert!(!text.contains("s3cure-pass"));
            assert!(!text.contains("pbkdf2"));
        }
    }

    #[tokio::test]
    async fn logout_expires_the_cookie_only() {
        let h = harness();
        let (status, headers, _) = send(&h.app, Method::POST, "/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
