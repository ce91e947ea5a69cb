//! helpdesk/crates/hd-services/src/lib.rs
//!
//! Application services sitting between the HTTP layer and the storage ports,
//! plus the background workers that run beside the request flow.

pub mod auth;
pub mod policy;
pub mod tickets;
pub mod users;
pub mod worker;

pub use auth::{identity_of, AuthService, Session};
pub use policy::CredentialPolicy;
pub use tickets::{NewImage, TicketQuery, TicketService};
pub use users::UserService;
pub use worker::{BackgroundWorker, ExpiryPolicy, TicketExpiryWorker, WorkerManager};
