//! # Helpdesk Binary
//!
//! The composition root: settings, logging, storage, services, the expiry
//! worker and the HTTP server, assembled from compile-time features.

#[cfg(not(all(feature = "db-sqlite", feature = "auth-jwt")))]
compile_error!("the helpdesk binary needs both the `db-sqlite` and `auth-jwt` features");

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hd_api::{AppState, IpRateLimiter};
use hd_config::{CredentialSettings, LogSettings, Settings};
use hd_core::models::TicketStatus;
use hd_core::traits::{AuthProvider, TicketRepo, UserRepo};
use hd_services::{AuthService, CredentialPolicy, ExpiryPolicy, TicketExpiryWorker, TicketService, UserService, WorkerManager};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use hd_db_sqlite::{SqliteTicketRepo, SqliteUserRepo};

#[cfg(feature = "auth-jwt")]
use hd_auth_jwt::JwtAuthProvider;

fn init_logging(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn credential_policy(c: &CredentialSettings) -> CredentialPolicy {
    CredentialPolicy {
        username_min_chars: c.username_min_chars,
        password_min_chars: c.password_min_chars,
        require_uppercase: c.require_uppercase,
        require_lowercase: c.require_lowercase,
        require_digit: c.require_digit,
        require_special: c.require_special,
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_logging(&settings.log);

    // 1. Storage
    let pool = hd_db_sqlite::connect(
        &settings.database.url,
        settings.database.max_connections,
        settings.database.acquire_timeout(),
    )
    .await
    .context("opening database")?;
    hd_db_sqlite::migrate(&pool).await.context("running migrations")?;

    let tickets: Arc<dyn TicketRepo> = Arc::new(SqliteTicketRepo::new(pool.clone()));
    let users: Arc<dyn UserRepo> = Arc::new(SqliteUserRepo::new(pool.clone()));

    // 2. Auth
    let auth: Arc<dyn AuthProvider> = Arc::new(JwtAuthProvider::new(
        settings.auth.jwt_secret.expose_secret(),
        chrono::TimeDelta::try_hours(settings.auth.expiration_hours).context("auth.expiration_hours is out of range")?,
    ));

    // 3. Services
    let policy = credential_policy(&settings.credentials);
    let state = AppState {
        auth: Arc::new(AuthService::new(users.clone(), auth.clone(), policy.clone())),
        users: Arc::new(UserService::new(users, auth.clone(), policy)),
        tickets: Arc::new(TicketService::new(tickets.clone())),
        tokens: auth,
        rate_limiter: IpRateLimiter::from_settings(
            settings.rate_limit.requests_per_minute,
            settings.rate_limit.burst,
            Duration::from_secs(settings.rate_limit.gc_interval_secs),
        )
        .map(Arc::new),
    };

    // 4. Background workers
    let mut workers = WorkerManager::new();
    if settings.worker.enabled {
        let status: TicketStatus = settings
            .worker
            .target_status
            .parse()
            .context("worker.target_status")?;
        workers.register(Arc::new(TicketExpiryWorker::new(
            tickets,
            ExpiryPolicy {
                interval: settings.worker.interval(),
                status,
                older_than_days: settings.worker.remove_after_days,
            },
        )));
    }
    workers.start_all();

    // 5. HTTP
    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "helpdesk listening");

    let app = hd_api::router(state).into_make_service_with_connect_info::<SocketAddr>();
    let grace = settings.server.shutdown_grace();
    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stopping_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    // In-flight requests get `grace` to finish once the signal arrives.
    tokio::select! {
        joined = &mut server => joined.context("server task")?.context("serving")?,
        _ = async {
            if stopping_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "grace period elapsed, dropping open connections");
            server.abort();
        }
    }

    workers.stop_all().await;
    pool.close().await;
    tracing::info!("helpdesk stopped");
    Ok(())
}
