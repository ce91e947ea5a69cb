//! # ApiError
//!
//! Every endpoint answers with the same JSON envelope:
//!
//! ```json
//! { "code": "not_found", "message": "Resource not found", "error": "ticket not found", "status": 404 }
//! ```
//!
//! [`ApiError`] turns an [`AppError`] into that envelope plus the matching
//! status code; [`ApiResponse`] is the success-side counterpart.

use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hd_core::error::AppError;
use serde::Serialize;
use serde_json::{json, Value};

/// Machine-readable values of the envelope's `code` field.
pub mod codes {
    pub const SUCCESS: &str = "success";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const RATE_LIMIT_ERROR: &str = "rate_limit_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const DUPLICATE_ENTRY: &str = "duplicate_entry";
    pub const CONFLICT: &str = "conflict";
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub status: u16,
}

/// Successful reply carrying optional `data`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self { status: StatusCode::OK, message: message.into(), data: Some(data) }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self { status: StatusCode::CREATED, message: message.into(), data: Some(data) }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { status: StatusCode::OK, message: message.into(), data: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            code: codes::SUCCESS,
            message: self.message,
            data: self.data,
            error: None,
            status: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None, retry_after: None }
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// One `{field, message}` entry per offending input.
    pub fn validation(fields: Vec<(String, String)>) -> Self {
        let details: Vec<Value> = fields
            .into_iter()
            .map(|(field, message)| json!({ "field": field, "message": message }))
            .collect();
        Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION_ERROR, "Validation failed").with_details(details)
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "Invalid input data").with_details(detail.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, "Unauthorized access").with_details(detail.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, codes::FORBIDDEN, "Access forbidden").with_details(detail.into())
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "Resource not found")
    }

    /// `retry_after` of zero means no delay could be computed; the header is then omitted.
    pub fn rate_limited(retry_after: Duration) -> Self {
        let mut err = Self::new(StatusCode::TOO_MANY_REQUESTS, codes::RATE_LIMIT_ERROR, "Rate limit exceeded");
        if !retry_after.is_zero() {
            err.retry_after = Some(retry_after);
        }
        err
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => ApiError::not_found().with_details(err.to_string()),
            AppError::NoStatusChange(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, "Bad request").with_details(err.to_string())
            }
            AppError::HasDependentTickets(_) => {
                ApiError::new(StatusCode::CONFLICT, codes::CONFLICT, "Resource still in use").with_details(err.to_string())
            }
            AppError::Conflict(detail) => {
                ApiError::new(StatusCode::CONFLICT, codes::DUPLICATE_ENTRY, "Resource already exists").with_details(detail)
            }
            AppError::Validation(detail) => {
                ApiError::new(StatusCode::BAD_REQUEST, codes::VALIDATION_ERROR, "Validation failed").with_details(detail)
            }
            AppError::Unauthorized(detail) => ApiError::unauthorized(detail),
            AppError::Forbidden(detail) => ApiError::forbidden(detail),
            AppError::RateLimited { retry_after_ms } => ApiError::rate_limited(Duration::from_millis(retry_after_ms)),
            AppError::Database(_) | AppError::Internal(_) => {
                // Storage details stay in the log.
                tracing::error!(error = %err, "request failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR, "Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

/// Whole seconds, rounded up so a client never retries too early.
pub(crate) fn retry_after_secs(delay: Duration) -> u64 {
    let secs = delay.as_secs();
    if delay.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            code: self.code,
            message: self.message,
            data: None,
            error: self.details,
            status: self.status.as_u16(),
        };
        let mut response = (self.status, Json(body)).into_response();

        if let Some(delay) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs(delay).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hd_core::error::Resource;

    #[test]
    fn domain_errors_map_to_distinct_statuses() {
        let cases = [
            (AppError::NotFound(Resource::Ticket), StatusCode::NOT_FOUND, codes::NOT_FOUND),
            (AppError::NoStatusChange("doing".into()), StatusCode::BAD_REQUEST, codes::BAD_REQUEST),
            (AppError::HasDependentTickets(2), StatusCode::CONFLICT, codes::CONFLICT),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT, codes::DUPLICATE_ENTRY),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST, codes::VALIDATION_ERROR),
            (AppError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED),
            (AppError::Forbidden("no".into()), StatusCode::FORBIDDEN, codes::FORBIDDEN),
            (AppError::RateLimited { retry_after_ms: 10 }, StatusCode::TOO_MANY_REQUESTS, codes::RATE_LIMIT_ERROR),
            (AppError::Database("locked".into()), StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn database_detail_is_not_exposed() {
        let api = ApiError::from(AppError::Database("UNIQUE constraint failed: users.email".into()));
        assert!(api.details.is_none());
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
    }

    #[test]
    fn sub_second_limiter_wait_advertises_whole_second() {
        let resp = ApiError::from(AppError::RateLimited { retry_after_ms: 400 }).into_response();
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "1");
        assert_eq!(retry_after_secs(Duration::from_millis(400)), 1);
    }

    #[test]
    fn rate_limit_response_carries_header_only_with_delay() {
        let with = ApiError::rate_limited(Duration::from_millis(900)).into_response();
        assert_eq!(with.headers().get(header::RETRY_AFTER).unwrap(), "1");

        let without = ApiError::rate_limited(Duration::ZERO).into_response();
        assert!(without.headers().get(header::RETRY_AFTER).is_none());
    }
}
