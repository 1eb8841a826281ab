use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fieldsync_core::sync::ErrorCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict {0} is already resolved")]
    AlreadyResolved(i64),
    #[error("Batch of {size} operations exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
    #[error("Rate limit exceeded; retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code carried in the response body
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::BatchTooLarge { .. } => "batch_too_large",
            Self::TooManyRequests { .. } => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyResolved(_) => StatusCode::CONFLICT,
            Self::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<fieldsync_core::Error> for AppError {
    fn from(error: fieldsync_core::Error) -> Self {
        use fieldsync_core::Error;
        match error {
            Error::NotFound(message) => Self::NotFound(message),
            Error::InvalidInput(message) => Self::BadRequest(message),
            Error::PermissionDenied(message) => Self::Forbidden(message),
            Error::AlreadyResolved(id) => Self::AlreadyResolved(id),
            Error::CapacityExceeded { size, max } => Self::BatchTooLarge { size, max },
            other => {
                tracing::error!(error = %other, "Storage failure");
                Self::Internal("storage failure".to_string())
            }
        }
    }
}

/// HTTP status for a failed single operation
pub const fn operation_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError | ErrorCode::UnknownOperationType => StatusCode::BAD_REQUEST,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict | ErrorCode::AlreadyResolved => StatusCode::CONFLICT,
        ErrorCode::IntegrityError | ErrorCode::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::TooManyRequests { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_maps_to_payload_too_large() {
        let error = AppError::from(fieldsync_core::Error::CapacityExceeded { size: 101, max: 100 });
        assert_eq!(error.code(), "batch_too_large");
        assert_eq!(error.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = AppError::TooManyRequests {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn operation_codes_map_to_statuses() {
        assert_eq!(operation_status(ErrorCode::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(
            operation_status(ErrorCode::InvalidState),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(operation_status(ErrorCode::UnknownOperationType), StatusCode::BAD_REQUEST);
    }
}
