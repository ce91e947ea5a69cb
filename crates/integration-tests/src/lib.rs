//! Shared fixtures for the cross-crate tests under `tests/`.

use std::sync::Arc;
use std::time::Duration;

use hd_api::{AppState, IpRateLimiter};
use hd_auth_jwt::JwtAuthProvider;
use hd_core::traits::{AuthProvider, TicketRepo, UserRepo};
use hd_db_sqlite::{SqlitePool, SqliteTicketRepo, SqliteUserRepo};
use hd_services::{AuthService, CredentialPolicy, TicketService, UserService};
use tempfile::TempDir;

pub const TEST_SECRET: &str = "integration-secret";

/// A migrated database in a temporary directory. Dropping it removes the file.
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("helpdesk.db").display());
        let pool = hd_db_sqlite::connect(&url, 4, Duration::from_secs(10)).await.expect("connect");
        hd_db_sqlite::migrate(&pool).await.expect("migrate");
        Self { _dir: dir, pool }
    }

    pub fn tickets(&self) -> Arc<dyn TicketRepo> {
        Arc::new(SqliteTicketRepo::new(self.pool.clone()))
    }

    pub fn users(&self) -> Arc<dyn UserRepo> {
        Arc::new(SqliteUserRepo::new(self.pool.clone()))
    }

    /// Full application state over this database, as the binary wires it.
    pub fn app_state(&self, rate_limiter: Option<IpRateLimiter>) -> AppState {
        let users = self.users();
        let auth: Arc<dyn AuthProvider> = Arc::new(JwtAuthProvider::new(TEST_SECRET, chrono::Duration::hours(1)));
        let policy = CredentialPolicy::default();

        AppState {
            auth: Arc::new(AuthService::new(users.clone(), auth.clone(), policy.clone())),
            users: Arc::new(UserService::new(users, auth.clone(), policy)),
            tickets: Arc::new(TicketService::new(self.tickets())),
            tokens: auth,
            rate_limiter: rate_limiter.map(Arc::new),
        }
    }
}
