pub mod auth;
pub mod tickets;
pub mod users;

use crate::error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn not_found() -> ApiError {
    ApiError::not_found().with_details("no such route")
}
