use axum::extract::State;

use super::ApiResult;
use crate::dto::{AuthResponse, LoginRequest, MasterRequest, RegisterRequest};
use crate::error::ApiResponse;
use crate::extract::ApiJson;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<ApiResponse<AuthResponse>> {
    let session = state.auth.register(&req.user_name, &req.user_email, &req.user_password).await?;
    Ok(ApiResponse::created("Registration successful", session.into()))
}

pub async fn enter(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> ApiResult<ApiResponse<AuthResponse>> {
    let session = state.auth.enter(&req.user_email, &req.user_password).await?;
    tracing::info!(user_id = session.user.id, "login succeeded");
    Ok(ApiResponse::ok("Login successful", session.into()))
}

pub async fn create_master(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MasterRequest>,
) -> ApiResult<ApiResponse<AuthResponse>> {
    let session = state.auth.create_master(&req.master_email, &req.master_password).await?;
    Ok(ApiResponse::created("Master user created successfully", session.into()))
}

pub async fn delete_master(State(state): State<AppState>, ApiJson(req): ApiJson<MasterRequest>) -> ApiResult<ApiResponse<()>> {
    state.auth.delete_master(&req.master_email, &req.master_password).await?;
    tracing::info!("master deleted");
    Ok(ApiResponse::message("Master user deleted successfully"))
}
