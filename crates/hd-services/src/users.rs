use std::sync::Arc;

use hd_core::error::{AppError, Resource, Result};
use hd_core::models::{NewUser, Role, User};
use hd_core::traits::{AuthProvider, UserRepo};

use crate::policy::{require_non_empty, CredentialPolicy};

/// Staff-facing account management.
pub struct UserService {
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
    policy: CredentialPolicy,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepo>, auth: Arc<dyn AuthProvider>, policy: CredentialPolicy) -> Self {
        Self { users, auth, policy }
    }

    /// One user by email (optionally also matching `role`), every user with `role`, or everyone.
    pub async fn fetch(&self, email: Option<&str>, role: Option<Role>) -> Result<Vec<User>> {
        match (email, role) {
            (Some(email), role) => {
                let user = self
                    .users
                    .find_by_email(email)
                    .await?
                    .filter(|u| role.map_or(true, |r| u.role == r))
                    .ok_or(AppError::NotFound(Resource::User))?;
                Ok(vec![user])
            }
            (None, Some(role)) => self.users.list_users_by_role(role).await,
            (None, None) => self.users.list_users().await,
        }
    }

    /// Creates a `user` or `admin`. The master is only provisioned through the auth service.
    pub async fn create(&self, username: &str, email: &str, password: &str, role: Role) -> Result<User> {
        if role == Role::Master {
            return Err(AppError::Validation("role must be 'user' or 'admin'".into()));
        }
        self.policy.check_registration(username, email, password)?;

        let password_hash = self.auth.hash_password(password).await?;
        let user = self
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role,
            })
            .await?;

        tracing::info!(user_id = user.id, role = %user.role, "account created");
        Ok(user)
    }

    pub async fn delete(&self, email: &str) -> Result<()> {
        require_non_empty("user_email", email)?;
        if let Some(target) = self.users.find_by_email(email).await? {
            if target.role == Role::Master {
                return Err(AppError::Forbidden("the master account cannot be deleted here".into()));
            }
        }
        self.users.delete_user(email).await
    }
}
