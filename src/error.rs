use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

/// Error taxonomy for the HTTP surface. Each variant maps to a fixed status
/// code; `Internal` never leaks its chain to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// Bad login credentials. The message is identical for "no such user" and
    /// "wrong password" so responses cannot be used for account enumeration.
    #[error("Invalid credentials")]
    Authentication,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Merged category for reset-token failures: "wrong token" and "expired
    /// token" are indistinguishable to the caller.
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Authentication => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            ApiError::InvalidToken | ApiError::ExpiredToken => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        // Unique violation on users.email; the store constraint is what
        // enforces uniqueness under concurrent registration.
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some("23505") {
                return ApiError::Conflict("Email already registered".into());
            }
        }
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        let message = match &self {
            ApiError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
