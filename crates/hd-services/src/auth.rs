//! Registration, login and master provisioning.

use std::sync::Arc;

use hd_core::error::{AppError, Resource, Result};
use hd_core::models::{Identity, NewUser, Role, User};
use hd_core::traits::{AuthProvider, UserRepo};

use crate::policy::CredentialPolicy;

/// Display name given to the provisioned master account.
pub const MASTER_USERNAME: &str = "Master";

pub fn identity_of(user: &User) -> Identity {
    Identity { user_id: user.id, email: user.email.clone(), role: user.role }
}

/// A freshly issued bearer token and the account it was issued for.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

pub struct AuthService {
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
    policy: CredentialPolicy,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepo>, auth: Arc<dyn AuthProvider>, policy: CredentialPolicy) -> Self {
        Self { users, auth, policy }
    }

    /// Creates a `user` account and returns a bearer token for it.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        self.policy.check_registration(username, email, password)?;
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AppError::Conflict(format!("email '{email}' is already registered")));
        }

        let password_hash = self.auth.hash_password(password).await?;
        let user = self
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = user.id, email = %user.email, "user registered");
        self.session_for(user)
    }

    /// Verifies credentials. Unknown email and wrong password fail identically.
    pub async fn enter(&self, email: &str, password: &str) -> Result<Session> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid email or password".into()))?;

        if !self.auth.verify_password(password, &user.password_hash).await {
            tracing::warn!(email, "login rejected");
            return Err(AppError::Unauthorized("invalid email or password".into()));
        }
        self.session_for(user)
    }

    /// Provisions the single master account.
    pub async fn create_master(&self, email: &str, password: &str) -> Result<Session> {
        self.policy.check_email(email)?;
        self.policy.check_password(password)?;
        // Early exit only; the repository insert re-checks atomically.
        if self.users.find_master().await?.is_some() {
            return Err(AppError::Conflict("a master account already exists".into()));
        }

        let password_hash = self.auth.hash_password(password).await?;
        let master = self
            .users
            .create_master(NewUser {
                username: MASTER_USERNAME.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::Master,
            })
            .await?;

        tracing::info!(user_id = master.id, "master provisioned");
        self.session_for(master)
    }

    fn session_for(&self, user: User) -> Result<Session> {
        let token = self.auth.issue_token(&identity_of(&user))?;
        Ok(Session { token, user })
    }

    /// Removes the master after re-checking its credentials.
    pub async fn delete_master(&self, email: &str, password: &str) -> Result<()> {
        let master = self
            .users
            .find_master()
            .await?
            .ok_or(AppError::NotFound(Resource::Master))?;

        if master.email != email || !self.auth.verify_password(password, &master.password_hash).await {
            return Err(AppError::Unauthorized("invalid master credentials".into()));
        }
        self.users.delete_master().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hd_core::traits::{MockAuthProvider, MockUserRepo};
    use mockall::predicate::eq;

    fn stored(id: i64, email: &str, role: Role) -> User {
        User {
            id,
            username: "someone".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(users: MockUserRepo, auth: MockAuthProvider) -> AuthService {
        AuthService::new(Arc::new(users), Arc::new(auth), CredentialPolicy::default())
    }

    #[tokio::test]
    async fn register_creates_user_role_and_returns_token() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_email().returning(|_| Ok(None));
        users
            .expect_create_user()
            .withf(|u| u.role == Role::User && u.password_hash == "hashed")
            .times(1)
            .returning(|u| Ok(stored(7, &u.email, u.role)));

        let mut auth = MockAuthProvider::new();
        auth.expect_hash_password().returning(|_| Ok("hashed".into()));
        auth.expect_issue_token()
            .withf(|id| id.user_id == 7 && id.role == Role::User)
            .returning(|_| Ok("token".into()));

        let session = service(users, auth)
            .register("alice123", "alice@example.com", "Str0ng!pass")
            .await
            .unwrap();
        assert_eq!(session.token, "token");
        assert_eq!(session.user.role, Role::User);
    }

    #[tokio::test]
    async fn register_rejects_weak_password_before_touching_storage() {
        let users = MockUserRepo::new();
        let auth = MockAuthProvider::new();

        let err = service(users, auth)
            .register("alice123", "alice@example.com", "weak")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn register_duplicate_email_is_conflict() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_by_email()
            .with(eq("alice@example.com"))
            .returning(|e| Ok(Some(stored(1, e, Role::User))));

        let err = service(users, MockAuthProvider::new())
            .register("alice123", "alice@example.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn enter_with_wrong_password_is_unauthorized() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_email().returning(|e| Ok(Some(stored(1, e, Role::User))));
        let mut auth = MockAuthProvider::new();
        auth.expect_verify_password().returning(|_, _| false);

        let err = service(users, auth).enter("alice@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn enter_unknown_email_is_unauthorized() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_email().returning(|_| Ok(None));

        let err = service(users, MockAuthProvider::new())
            .enter("ghost@example.com", "whatever")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn second_master_is_a_conflict() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_master()
            .returning(|| Ok(Some(stored(1, "m@example.com", Role::Master))));

        let err = service(users, MockAuthProvider::new())
            .create_master("other@example.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_master_uses_fixed_username() {
        let mut users = MockUserRepo::new();
        users.expect_find_master().returning(|| Ok(None));
        users
            .expect_create_master()
            .withf(|u| u.username == MASTER_USERNAME && u.role == Role::Master)
            .returning(|u| Ok(stored(1, &u.email, u.role)));
        let mut auth = MockAuthProvider::new();
        auth.expect_hash_password().returning(|_| Ok("hashed".into()));
        auth.expect_issue_token().returning(|_| Ok("master-token".into()));

        let session = service(users, auth)
            .create_master("m@example.com", "Str0ng!pass")
            .await
            .unwrap();
        assert_eq!(session.token, "master-token");
        assert_eq!(session.user.email, "m@example.com");
    }

    #[tokio::test]
    async fn master_created_concurrently_elsewhere_is_a_conflict() {
        let mut users = MockUserRepo::new();
        users.expect_find_master().returning(|| Ok(None));
        users
            .expect_create_master()
            .returning(|_| Err(AppError::Conflict("a master account already exists".into())));
        let mut auth = MockAuthProvider::new();
        auth.expect_hash_password().returning(|_| Ok("hashed".into()));
        auth.expect_issue_token().times(0);

        let err = service(users, auth)
            .create_master("m@example.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_master_requires_matching_credentials() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_master()
            .returning(|| Ok(Some(stored(1, "m@example.com", Role::Master))));
        users.expect_delete_master().times(0);
        let mut auth = MockAuthProvider::new();
        auth.expect_verify_password().returning(|_, _| true);

        let err = service(users, auth)
            .delete_master("someone-else@example.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn delete_master_propagates_dependent_ticket_block() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_master()
            .returning(|| Ok(Some(stored(1, "m@example.com", Role::Master))));
        users
            .expect_delete_master()
            .returning(|| Err(AppError::HasDependentTickets(2)));
        let mut auth = MockAuthProvider::new();
        auth.expect_verify_password().returning(|_, _| true);

        let err = service(users, auth)
            .delete_master("m@example.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HasDependentTickets(2)));
    }
}
