use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy shared by every service. Each variant maps to one HTTP
/// status and a stable machine-readable code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient wallet balance. Please recharge your wallet.")]
    InsufficientFunds,
    #[error("{0}")]
    Integrity(String),
    #[error("{0}")]
    ExternalService(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Too many attempts. Try again in a few minutes.")]
    RateLimited,
    #[error("Internal server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::Integrity(_) => StatusCode::CONFLICT,
            ApiError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ApiError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::InsufficientFunds => "insufficient_funds",
            ApiError::Integrity(_) => "integrity_error",
            ApiError::ExternalService(_) => "external_service_error",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            tracing::error!("internal error: {e:#}");
        }
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (self.status(), body).into_response()
    }
}

/// Database errors are folded into the taxonomy: unique-constraint hits are
/// conflicts (duplicate slot, duplicate token), FK violations on delete are
/// integrity errors, everything else is internal.
impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return ApiError::Conflict("A conflicting record already exists.".into())
                }
                Some("23503") => {
                    return ApiError::Integrity(
                        "Record is referenced by existing history and cannot be removed.".into(),
                    )
                }
                _ => {}
            }
        }
        ApiError::Internal(e.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
