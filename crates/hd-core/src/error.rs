//! # AppError
//!
//! Centralized error handling for the helpdesk.
//! Every repository and service returns these kinds; the API layer maps them onto HTTP.

use std::fmt;

use thiserror::Error;

/// The entity a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Ticket,
    User,
    Master,
    /// Ticket author resolved by email at creation time
    Author,
    Counters,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ticket => "ticket",
            Self::User => "user",
            Self::Master => "master",
            Self::Author => "author",
            Self::Counters => "counters",
        })
    }
}

/// The primary error type for all hd-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(Resource),

    /// Status update requested the status the ticket already has
    #[error("ticket already has status '{0}'")]
    NoStatusChange(String),

    /// User deletion refused while tickets still reference the user
    #[error("user still has {0} ticket(s)")]
    HasDependentTickets(i64),

    /// Resource already exists (e.g., duplicate email, second master)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed or out-of-policy input
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing, malformed or expired credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role is not allowed here
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Client exhausted its request budget; a retry succeeds after the delay
    #[error("too many requests: retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Storage failure, including begin/commit failures of a transaction
    #[error("database error: {0}")]
    Database(String),

    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for helpdesk logic.
pub type Result<T> = std::result::Result<T, AppError>;
