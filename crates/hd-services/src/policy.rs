//! Input rules shared by the auth and user services.

use base64::Engine;
use hd_core::error::{AppError, Result};

/// Characters that satisfy the special-character requirement.
pub const SPECIAL_CHARS: &str = "!@#$%^&*";

/// Credential rules applied when an account is created.
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    pub username_min_chars: usize,
    pub password_min_chars: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            username_min_chars: 6,
            password_min_chars: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

impl CredentialPolicy {
    pub fn check_email(&self, email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(AppError::Validation("email is required".into()));
        }
        if !email.contains('@') || !email.contains('.') {
            return Err(AppError::Validation(format!("invalid email '{email}'")));
        }
        Ok(())
    }

    pub fn check_username(&self, username: &str) -> Result<()> {
        if username.chars().count() < self.username_min_chars {
            return Err(AppError::Validation(format!(
                "username must be at least {} characters",
                self.username_min_chars
            )));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Validation(
                "username can only contain letters, numbers and underscores".into(),
            ));
        }
        Ok(())
    }

    /// Reports every unmet requirement at once.
    pub fn check_password(&self, password: &str) -> Result<()> {
        let mut missing = Vec::new();
        if password.chars().count() < self.password_min_chars {
            missing.push(format!("at least {} characters", self.password_min_chars));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            missing.push("an uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            missing.push("a lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            missing.push("a digit".to_string());
        }
        if self.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            missing.push("a special character".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(format!("password needs {}", missing.join(", "))))
        }
    }

    pub fn check_registration(&self, username: &str, email: &str, password: &str) -> Result<()> {
        self.check_email(email)?;
        self.check_username(username)?;
        self.check_password(password)
    }
}

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Accepts jpeg/png/gif payloads whose content is standard base64.
pub fn check_image(name: &str, content_type: &str, content_base64: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("image name is required".into()));
    }
    if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
        return Err(AppError::Validation(format!("unsupported image type '{content_type}'")));
    }
    base64::engine::general_purpose::STANDARD
        .decode(content_base64)
        .map_err(|_| AppError::Validation(format!("image '{name}' is not valid base64")))?;
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}
