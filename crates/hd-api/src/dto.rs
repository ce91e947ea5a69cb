//! Wire shapes. Field names are part of the public API and stay snake_case with a resource prefix.

use chrono::{DateTime, SecondsFormat, Utc};
use hd_core::models::{Counters, Image, Role, TicketDetails, TicketHistory, TicketStatus, TicketSummary, User};
use hd_services::{NewImage, Session, TicketQuery};
use serde::{Deserialize, Serialize};

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_email: String,
    pub user_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_password: String,
}

#[derive(Debug, Deserialize)]
pub struct MasterRequest {
    pub master_email: String,
    pub master_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_password: String,
    pub user_role: Role,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub user_email: String,
}

#[derive(Debug, Deserialize)]
pub struct UserFetchParams {
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub image_name: String,
    pub image_content: String,
    pub image_type: String,
}

impl From<ImagePayload> for NewImage {
    fn from(p: ImagePayload) -> Self {
        NewImage { name: p.image_name, content_type: p.image_type, content_base64: p.image_content }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub ticket_name: String,
    pub ticket_explain: String,
    #[serde(default)]
    pub ticket_images: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketStatusRequest {
    pub ticket_id: String,
    pub ticket_status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketHistoryRequest {
    pub ticket_id: String,
    pub ticket_return: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveTicketRequest {
    pub ticket_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketFetchParams {
    pub author: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub name: Option<String>,
}

impl From<TicketFetchParams> for TicketQuery {
    fn from(p: TicketFetchParams) -> Self {
        TicketQuery { author: p.author, status: p.status, date: p.date, name: p.name }
    }
}

#[derive(Debug, Deserialize)]
pub struct TicketInfoParams {
    pub ticket_id: Option<String>,
}

// ── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: SessionUser,
}

impl From<Session> for AuthResponse {
    fn from(s: Session) -> Self {
        AuthResponse { token: s.token, user: SessionUser { email: s.user.email, role: s.user.role } }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_name: String,
    pub user_email: String,
    pub user_created_at: String,
    pub user_role: Role,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            user_created_at: timestamp(&u.created_at),
            user_name: u.username,
            user_email: u.email,
            user_role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersList {
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Serialize)]
pub struct CountersResponse {
    pub tickets_total: i64,
    pub tickets_pending: i64,
    pub tickets_doing: i64,
    pub tickets_concluded: i64,
}

impl From<Counters> for CountersResponse {
    fn from(c: Counters) -> Self {
        CountersResponse {
            tickets_total: c.total,
            tickets_pending: c.pending,
            tickets_doing: c.doing,
            tickets_concluded: c.concluded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketCreated {
    pub ticket_id: String,
    pub ticket_status: TicketStatus,
    pub ticket_date: String,
}

/// Listing row. Tickets whose author can no longer be resolved show "Unknown User".
#[derive(Debug, Serialize)]
pub struct TicketBrief {
    pub ticket_id: String,
    pub ticket_name: String,
    pub ticket_status: TicketStatus,
    pub ticket_author: String,
    pub ticket_date: String,
}

impl From<TicketSummary> for TicketBrief {
    fn from(t: TicketSummary) -> Self {
        TicketBrief {
            ticket_date: timestamp(&t.created_at),
            ticket_id: t.id,
            ticket_name: t.name,
            ticket_status: t.status,
            ticket_author: t.author_name.unwrap_or_else(|| "Unknown User".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketsList {
    pub tickets: Vec<TicketBrief>,
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub image_id: String,
    pub image_name: String,
    pub image_type: String,
    pub image_base64: String,
    pub image_uploaded_at: String,
}

impl From<Image> for ImageView {
    fn from(i: Image) -> Self {
        ImageView {
            image_uploaded_at: timestamp(&i.uploaded_at),
            image_id: i.id,
            image_name: i.name,
            image_type: i.content_type,
            image_base64: i.content_base64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub ticket_return: String,
    pub ticket_date: String,
}

impl From<TicketHistory> for HistoryView {
    fn from(h: TicketHistory) -> Self {
        HistoryView { ticket_date: timestamp(&h.created_at), ticket_return: h.message }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    pub ticket_id: String,
    pub ticket_name: String,
    pub ticket_status: TicketStatus,
    pub ticket_explain: String,
    pub ticket_email: String,
    pub ticket_images: Vec<ImageView>,
    pub ticket_history: Vec<HistoryView>,
    pub ticket_date: String,
    pub ticket_updated_at: String,
}

impl From<TicketDetails> for TicketDetail {
    fn from(d: TicketDetails) -> Self {
        let t = d.ticket;
        TicketDetail {
            ticket_date: timestamp(&t.created_at),
            ticket_updated_at: timestamp(&t.updated_at),
            ticket_id: t.id,
            ticket_name: t.name,
            ticket_status: t.status,
            ticket_explain: t.explanation,
            ticket_email: t.author_email,
            ticket_images: d.images.into_iter().map(ImageView::from).collect(),
            ticket_history: d.history.into_iter().map(HistoryView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketEnvelope {
    pub ticket: TicketDetail,
}
