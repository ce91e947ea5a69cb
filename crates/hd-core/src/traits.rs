//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Counters, Identity, Image, NewUser, Role, Ticket, TicketDetails, TicketFilter, TicketHistory, TicketStatus,
    TicketSummary, User,
};

/// Data persistence contract for tickets, their children and the counters row.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait TicketRepo: Send + Sync {
    /// Resolves the author by `ticket.author_email` and inserts the ticket plus its images atomically.
    /// Fails with `NotFound(Author)` and persists nothing when the author is unknown.
    async fn create_ticket(&self, ticket: Ticket, images: Vec<Image>) -> Result<Ticket>;

    /// Increments the bucket for `status` and the grand total, creating the row on first use.
    async fn count_ticket(&self, status: TicketStatus) -> Result<()>;
    async fn get_counters(&self) -> Result<Counters>;

    async fn get_ticket(&self, id: &str) -> Result<Ticket>;
    async fn get_ticket_details(&self, id: &str) -> Result<TicketDetails>;
    async fn find_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketSummary>>;

    /// Rejects a transition to the current status with `NoStatusChange`.
    async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<()>;
    async fn add_ticket_history(&self, id: &str, message: &str) -> Result<TicketHistory>;

    /// Removes images, history and the ticket in one transaction.
    async fn delete_ticket(&self, id: &str) -> Result<()>;

    /// Bulk removal used by the expiry worker. Returns the number of tickets removed.
    async fn remove_tickets_with_status(&self, status: TicketStatus, older_than_days: i64) -> Result<u64>;
}

/// Data persistence contract for accounts.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` on a duplicate email.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    /// Inserts `user` only while no master exists; `Conflict` otherwise.
    /// The existence check and the insert are a single statement.
    async fn create_master(&self, user: NewUser) -> Result<User>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_master(&self) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>>;

    /// Refused with `HasDependentTickets` while any ticket references `email`.
    async fn delete_user(&self, email: &str) -> Result<()>;
    /// Same guard as `delete_user`, applied to the single master account.
    async fn delete_master(&self) -> Result<()>;
}

/// Credential hashing and bearer token contract.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String>;

    /// Returns false for a wrong password and for a malformed hash alike.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;

    fn issue_token(&self, identity: &Identity) -> Result<String>;

    /// Fails with `Unauthorized` for bad signatures and expired tokens.
    fn verify_token(&self, token: &str) -> Result<Identity>;
}
