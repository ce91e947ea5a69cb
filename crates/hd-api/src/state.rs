use std::sync::Arc;

use hd_core::traits::AuthProvider;
use hd_services::{AuthService, TicketService, UserService};

use crate::limiter::IpRateLimiter;

/// Everything a handler or middleware can reach. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub tickets: Arc<TicketService>,
    /// Verifies bearer tokens in the auth middleware
    pub tokens: Arc<dyn AuthProvider>,
    /// `None` when rate limiting is switched off
    pub rate_limiter: Option<Arc<IpRateLimiter>>,
}
