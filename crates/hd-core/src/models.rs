//! # Domain Models
//!
//! These structs represent the core entities of the helpdesk.
//! Tickets carry an opaque, prefixed string id; users a database-assigned integer id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle state of a ticket. Transitions are free-form, but never to the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Doing,
    Concluded,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [Self::Pending, Self::Doing, Self::Concluded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Doing => "doing",
            Self::Concluded => "concluded",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "doing" => Ok(Self::Doing),
            "concluded" => Ok(Self::Concluded),
            other => Err(AppError::Validation(format!("invalid ticket status '{other}'"))),
        }
    }
}

/// Access level of a user. `Master` is unique per deployment and passes every role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Master,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "master" => Ok(Self::Master),
            other => Err(AppError::Validation(format!("invalid user role '{other}'"))),
        }
    }
}

/// A support request opened by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub name: String,
    pub explanation: String,
    pub status: TicketStatus,
    /// Resolved from `author_email` by the repository at creation time
    pub author_id: i64,
    pub author_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Builds a fresh `pending` ticket. `author_id` stays 0 until the repository resolves the author.
    pub fn new(name: impl Into<String>, explanation: impl Into<String>, author_email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("ticket_{}", Uuid::new_v4()),
            name: name.into(),
            explanation: explanation.into(),
            status: TicketStatus::Pending,
            author_id: 0,
            author_email: author_email.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Screenshot or attachment stored inline as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub ticket_id: String,
    pub name: String,
    pub content_type: String,
    pub content_base64: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Image {
    pub fn new(
        ticket_id: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        content_base64: impl Into<String>,
    ) -> Self {
        let short = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("img_{}", &short[..8]),
            ticket_id: ticket_id.into(),
            name: name.into(),
            content_type: content_type.into(),
            content_base64: content_base64.into(),
            uploaded_at: Utc::now(),
        }
    }
}

/// Append-only reply attached to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketHistory {
    pub id: i64,
    pub ticket_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A ticket together with its children, as returned by the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub images: Vec<Image>,
    pub history: Vec<TicketHistory>,
}

/// Listing row: a ticket joined with its author's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: String,
    pub name: String,
    pub status: TicketStatus,
    /// `None` when the author row no longer resolves
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Running totals kept in the singleton counters row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub pending: i64,
    pub doing: i64,
    pub concluded: i64,
    pub total: i64,
}

impl Counters {
    pub fn for_status(&self, status: TicketStatus) -> i64 {
        match status {
            TicketStatus::Pending => self.pending,
            TicketStatus::Doing => self.doing,
            TicketStatus::Concluded => self.concluded,
        }
    }
}

/// Optional, AND-combined criteria for ticket listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketFilter {
    pub author_email: Option<String>,
    pub status: Option<TicketStatus>,
    /// Tickets created on or after this day (UTC)
    pub created_since: Option<NaiveDate>,
    /// Case-insensitive substring of the ticket name
    pub name: Option<String>,
}

impl TicketFilter {
    /// Parses the `YYYY-MM-DD` form accepted by the date filter.
    pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::Validation(format!("invalid date format '{raw}', expected YYYY-MM-DD")))
    }

    pub fn is_empty(&self) -> bool {
        self.author_email.is_none() && self.status.is_none() && self.created_since.is_none() && self.name.is_none()
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a user; the password is already hashed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Resolved caller identity, attached once per request by the authentication stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl Identity {
    /// Master passes every check; everyone else must hold one of `allowed`.
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.role == Role::Master || allowed.contains(&self.role)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Master)
    }
}
