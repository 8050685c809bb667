use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::store::StoreError;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound {
        message: String,
    },
    MissingFields {
        message: String,
        fields: Vec<String>,
    },
    InvalidPayload {
        message: String,
    },
    ValidationFailed {
        message: String,
        fields: Vec<String>,
    },
    UserAlreadyExists {
        message: String,
    },
    AuthenticationFailure {
        message: String,
    },
    Unauthorized {
        message: String,
    },
    InternalError {
        kind: &'static str,
        message: String,
    },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MissingFields { .. }
            | Error::InvalidPayload { .. }
            | Error::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            Error::UserAlreadyExists { .. } => StatusCode::CONFLICT,
            Error::AuthenticationFailure { .. } | Error::Unauthorized { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn unauthorized() -> Error {
        Error::Unauthorized {
            message: "Unauthorized".to_string(),
        }
    }

    pub fn invalid_credentials() -> Error {
        Error::AuthenticationFailure {
            message: "Invalid credentials".to_string(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::InternalError {
            kind,
            message: msg.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // details stay in the server log
            Error::InternalError { kind, message } => {
                log::error!("{}: {}", kind, message);
                (
                    status,
                    Json(serde_json::json!({
                        "error": "InternalError",
                        "message": "Internal server error",
                    })),
                )
                    .into_response()
            }
            other => (status, Json(other)).into_response(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => Self::ValidationFailed {
                message: format!("`{}` is already taken", field),
                fields: vec![field.to_string()],
            },
            StoreError::Corrupted(message) => Self::InternalError {
                kind: "CorruptedRecord",
                message,
            },
            StoreError::Database(err) => Self::InternalError {
                kind: "DatabaseError",
                message: err.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidPayload {
            message: rejection.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "HashingError",
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::InternalError {
            kind: "TokenError",
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError {
            kind: "JoinError",
            message: err.to_string(),
        }
    }
}
