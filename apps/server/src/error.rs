//! HTTP error responses.
//!
//! Every failure leaves the server as `{"code": "...", "message": "..."}`
//! with a status chosen from the engine error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use quan_core::CoreError;
use quan_engine::EngineError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            EngineError::Core(core) => match core {
                CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
                CoreError::AlreadyDecided { .. } => (StatusCode::CONFLICT, "ALREADY_DECIDED"),
                CoreError::RequestClosed { .. } => (StatusCode::CONFLICT, "REQUEST_CLOSED"),
                CoreError::InvalidSignature { .. } => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
                CoreError::MalformedPayload { .. } => (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD"),
                CoreError::Underpaid { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "UNDERPAID"),
                CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            },
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            EngineError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            EngineError::InvalidConfig(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            e if e.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
            _ => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };
        ApiError::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use quan_core::OrderItemStatus;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EngineError::not_found("Order", "o1"), StatusCode::NOT_FOUND),
            (EngineError::conflict("occupied"), StatusCode::CONFLICT),
            (EngineError::Forbidden("waiter".into()), StatusCode::FORBIDDEN),
            (
                EngineError::Core(CoreError::InvalidTransition {
                    from: OrderItemStatus::Served,
                    to: OrderItemStatus::Waiting,
                }),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Core(CoreError::invalid_signature("momo")),
                StatusCode::UNAUTHORIZED,
            ),
            (EngineError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
