use axum::extract::State;

use super::ApiResult;
use crate::dto::{CreateUserRequest, DeleteUserRequest, UserFetchParams, UserResponse, UsersList};
use crate::error::ApiResponse;
use crate::extract::{ApiJson, ApiQuery, AuthUser};
use crate::state::AppState;

pub async fn fetch(State(state): State<AppState>, ApiQuery(params): ApiQuery<UserFetchParams>) -> ApiResult<ApiResponse<UsersList>> {
    let users = state.users.fetch(params.email.as_deref(), params.role).await?;
    let users = users.into_iter().map(UserResponse::from).collect();
    Ok(ApiResponse::ok("Users found", UsersList { users }))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<ApiResponse<UserResponse>> {
    let user = state
        .users
        .create(&req.user_name, &req.user_email, &req.user_password, req.user_role)
        .await?;
    tracing::info!(by = %caller.email, user_id = user.id, "user created by staff");
    Ok(ApiResponse::created("User created successfully", user.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(req): ApiJson<DeleteUserRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.users.delete(&req.user_email).await?;
    tracing::info!(by = %caller.email, email = %req.user_email, "user deleted");
    Ok(ApiResponse::message("User deleted successfully"))
}
