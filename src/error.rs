use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Every failure the auth core can hand back to a caller. All variants are
/// recoverable by the caller (retry signup, request a fresh code, re-login);
/// none of them take the process down.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("account already exists")]
    AlreadyExists,

    #[error("account not found")]
    NotFound,

    #[error("invalid password")]
    InvalidPassword,

    #[error("no code requested for this email")]
    NotRequested,

    #[error("expired")]
    Expired,

    #[error("code does not match")]
    Mismatch,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("token is malformed")]
    Malformed,

    #[error("delivery failed")]
    Delivery(#[source] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable kind, independent of the display message.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::AlreadyExists => "already_exists",
            AuthError::NotFound => "not_found",
            AuthError::InvalidPassword => "invalid_password",
            AuthError::NotRequested => "not_requested",
            AuthError::Expired => "expired",
            AuthError::Mismatch => "mismatch",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Malformed => "malformed",
            AuthError::Delivery(_) => "delivery_error",
            AuthError::Database(_) => "database_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::NotRequested
            | AuthError::Expired
            | AuthError::Mismatch
            | AuthError::InvalidSignature
            | AuthError::Malformed => StatusCode::BAD_REQUEST,
            AuthError::AlreadyExists => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidPassword => StatusCode::UNAUTHORIZED,
            AuthError::Delivery(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side details stay in the log; the payload only carries the
        // stable kind and a short message.
        let message = match &self {
            AuthError::Delivery(e) => {
                error!(error = %e, "mail delivery failed");
                "could not deliver mail".to_string()
            }
            AuthError::Database(e) => {
                error!(error = %e, "database error");
                "internal error".to_string()
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                error: self.kind(),
                message,
            }),
        )
            .into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
