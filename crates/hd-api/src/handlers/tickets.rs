use axum::extract::State;

use super::ApiResult;
use crate::dto::{
    CountersResponse, CreateTicketRequest, RemoveTicketRequest, TicketBrief, TicketCreated, TicketEnvelope,
    TicketFetchParams, TicketInfoParams, TicketsList, UpdateTicketHistoryRequest, UpdateTicketStatusRequest,
};
use crate::error::{ApiError, ApiResponse};
use crate::extract::{ApiJson, ApiQuery, AuthUser};
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(req): ApiJson<CreateTicketRequest>,
) -> ApiResult<ApiResponse<TicketCreated>> {
    let images = req.ticket_images.into_iter().map(Into::into).collect();
    let ticket = state
        .tickets
        .create(&caller, &req.ticket_name, &req.ticket_explain, images)
        .await?;

    Ok(ApiResponse::created(
        "Ticket created successfully",
        TicketCreated {
            ticket_date: ticket.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ticket_id: ticket.id,
            ticket_status: ticket.status,
        },
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(req): ApiJson<RemoveTicketRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.tickets.remove(&caller, &req.ticket_id).await?;
    Ok(ApiResponse::message("Ticket removed successfully"))
}

pub async fn count(State(state): State<AppState>) -> ApiResult<ApiResponse<CountersResponse>> {
    let counters = state.tickets.counters().await?;
    Ok(ApiResponse::ok("Ticket counters", counters.into()))
}

pub async fn fetch(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TicketFetchParams>,
) -> ApiResult<ApiResponse<TicketsList>> {
    let found = state.tickets.fetch(params.into()).await?;
    tracing::debug!(count = found.len(), "tickets listed");
    let tickets = found.into_iter().map(TicketBrief::from).collect();
    Ok(ApiResponse::ok("Tickets found", TicketsList { tickets }))
}

pub async fn info(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TicketInfoParams>,
) -> ApiResult<ApiResponse<TicketEnvelope>> {
    let ticket_id = params
        .ticket_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::invalid_input("ticket_id is required"))?;

    let details = state.tickets.info(&ticket_id).await?;
    Ok(ApiResponse::ok("Ticket details found", TicketEnvelope { ticket: details.into() }))
}

pub async fn edit(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(req): ApiJson<UpdateTicketStatusRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.tickets.edit(&req.ticket_id, req.ticket_status).await?;
    tracing::info!(by = %caller.email, ticket_id = %req.ticket_id, "ticket status updated");
    Ok(ApiResponse::message("Ticket status updated successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateTicketHistoryRequest>,
) -> ApiResult<ApiResponse<()>> {
    state.tickets.reply(&req.ticket_id, &req.ticket_return).await?;
    Ok(ApiResponse::message("Ticket history added successfully"))
}
