//! Stateless session tokens: HS256-signed JWTs carrying the account id.
//!
//! Nothing is persisted. A token stays valid until it expires; there is no
//! way to revoke one early.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;

pub const SESSION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Who a verified token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success(Identity),
    SessionExpired,
    InvalidSession,
}

impl AuthResult {
    pub fn identity(self) -> Option<Identity> {
        match self {
            AuthResult::Success(identity) => Some(identity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime: Duration::days(SESSION_DAYS),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, account_id: Uuid) -> Result<IssuedToken, Error> {
        self.issue_at(account_id, Utc::now())
    }

    pub fn issue_at(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<IssuedToken, Error> {
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Never fails: every problem with the token is folded into the result.
    pub fn verify(&self, token: &str) -> AuthResult {
        let claims = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                return AuthResult::SessionExpired
            }
            Err(err) => {
                log::debug!("Rejected session token: {}", err);
                return AuthResult::InvalidSession;
            }
        };

        let account_id = match claims.sub.parse::<Uuid>() {
            Ok(id) => id,
            Err(_) => return AuthResult::InvalidSession,
        };
        match (
            Utc.timestamp_opt(claims.iat, 0).single(),
            Utc.timestamp_opt(claims.exp, 0).single(),
        ) {
            (Some(issued_at), Some(expires_at)) => AuthResult::Success(Identity {
                account_id,
                issued_at,
                expires_at,
            }),
            _ => AuthResult::InvalidSession,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let tokens = TokenService::new(b"test-secret-key-12345");
        let account_id = Uuid::new_v4();

        let issued = tokens.issue(account_id).unwrap();
        assert!(!issued.token.is_empty());

        let identity = tokens.verify(&issued.token).identity().unwrap();
        assert_eq!(identity.account_id, account_id);
        assert_eq!(identity.expires_at.timestamp(), issued.expires_at.timestamp());
        assert_eq!(
            identity.expires_at - identity.issued_at,
            Duration::days(SESSION_DAYS)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new(b"test-secret-key-12345");
        let long_ago = Utc::now() - Duration::days(SESSION_DAYS + 1);
        let issued = tokens.issue_at(Uuid::new_v4(), long_ago).unwrap();

        assert_eq!(tokens.verify(&issued.token), AuthResult::SessionExpired);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let ours = TokenService::new(b"secret1");
        let theirs = TokenService::new(b"secret2");
        let issued = theirs.issue(Uuid::new_v4()).unwrap();

        assert_eq!(ours.verify(&issued.token), AuthResult::InvalidSession);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = TokenService::new(b"test-secret-key-12345");
        for garbage in ["", "invalid.token.here", "abc", "a.b", "...."] {
            assert_eq!(tokens.verify(garbage), AuthResult::InvalidSession);
        }
    }

    #[test]
    fn tampered_token_is_rejected() {
        let tokens = TokenService::new(b"test-secret-key-12345");
        let victim = tokens.issue(Uuid::new_v4()).unwrap();
        let attacker = tokens.issue(Uuid::new_v4()).unwrap();

        // attacker's claims under the victim's signature
        let v: Vec<&str> = victim.token.split('.').collect();
        let a: Vec<&str> = attacker.token.split('.').collect();
        let forged = format!("{}.{}.{}", v[0], a[1], v[2]);

        assert_eq!(tokens.verify(&forged), AuthResult::InvalidSession);
    }
}
