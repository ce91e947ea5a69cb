//! # hd-config
//!
//! Layered settings: compiled defaults, then an optional `helpdesk.toml`,
//! then `HELPDESK_*` environment variables (`__` separates nested keys,
//! e.g. `HELPDESK_RATE_LIMIT__REQUESTS_PER_MINUTE=120`).

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub credentials: CredentialSettings,
    pub worker: WorkerSettings,
    pub rate_limit: RateLimitSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// In-flight requests get this long to finish after a shutdown signal
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8080, shutdown_grace_secs: 5 }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: "sqlite://helpdesk.db".into(), max_connections: 10, acquire_timeout_secs: 5 }
    }
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(deserialize_with = "secret_from_string")]
    pub jwt_secret: SecretString,
    pub expiration_hours: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self { jwt_secret: SecretString::from(String::new()), expiration_hours: 24 }
    }
}

fn secret_from_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Rules applied to usernames and passwords at registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub username_min_chars: usize,
    pub password_min_chars: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for CredentialSettings {
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

/// Upper bounds keep derived durations and timestamps representable.
pub const MAX_TOKEN_HOURS: i64 = 24 * 365;
pub const MAX_WORKER_INTERVAL_HOURS: u64 = 24 * 365;
pub const MAX_REMOVE_AFTER_DAYS: i64 = 365 * 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub enabled: bool,
    pub interval_hours: u64,
    /// Status whose tickets expire, in its lowercase storage form
    pub target_status: String,
    pub remove_after_days: i64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { enabled: true, interval_hours: 30, target_status: "concluded".into(), remove_after_days: 10 }
    }
}

impl WorkerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}

/// A non-positive `requests_per_minute` disables rate limiting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_minute: i64,
    pub burst: i64,
    pub gc_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { requests_per_minute: 100, burst: 60, gc_interval_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".into(), json: false }
    }
}

impl Settings {
    /// Loads `.env` (if any), `helpdesk.toml` (if any) and `HELPDESK_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }

        let builder = Config::builder()
            .add_source(File::with_name("helpdesk").required(false))
            .add_source(
                Environment::with_prefix("HELPDESK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    /// Builds settings from a TOML document layered over the defaults.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(document, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.expose_secret().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must be set".into()));
        }
        if !(1..=MAX_TOKEN_HOURS).contains(&self.auth.expiration_hours) {
            return Err(ConfigError::Invalid(format!(
                "auth.expiration_hours must be between 1 and {MAX_TOKEN_HOURS}"
            )));
        }
        if self.worker.enabled && !(1..=MAX_WORKER_INTERVAL_HOURS).contains(&self.worker.interval_hours) {
            return Err(ConfigError::Invalid(format!(
                "worker.interval_hours must be between 1 and {MAX_WORKER_INTERVAL_HOURS}"
            )));
        }
        if !(0..=MAX_REMOVE_AFTER_DAYS).contains(&self.worker.remove_after_days) {
            return Err(ConfigError::Invalid(format!(
                "worker.remove_after_days must be between 0 and {MAX_REMOVE_AFTER_DAYS}"
            )));
        }
        Ok(())
    }
}
