use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure a handler can produce. Rendered as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Email already in use")]
    DuplicateEmail,

    #[error("Invalid Google token")]
    InvalidIdentityToken,

    /// Same response for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication failed")]
    Unauthorized,

    /// Also used when the caller does not own the resource.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::Error::new(e).context("spawn_blocking join error"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) | Self::DuplicateEmail | Self::InvalidIdentityToken => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(e) => {
                error!("{:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
