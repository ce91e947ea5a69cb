//! # hd-api
//!
//! The HTTP surface of the helpdesk: routing, request pipeline, DTOs and the
//! response envelope.
//!
//! Everything under `/api` is rate limited per client IP and validated before
//! routing. Routes are split into three groups:
//!
//! - public: registration, login and master provisioning
//! - members: any authenticated caller
//! - staff: admins (and the master)
//!
//! `/health` sits outside `/api` and is never rate limited.

pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod limiter;
pub mod middleware;
pub mod state;

use axum::http::{header, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use hd_core::models::Role;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResponse};
pub use limiter::IpRateLimiter;
pub use state::AppState;

use handlers::{auth, tickets, users};
use middleware::{rate_limit, require_auth, require_roles, validate_request, RequiredRoles};

const STAFF: &[Role] = &[Role::Admin];

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/enter", post(auth::enter))
        .route("/master/create", post(auth::create_master))
        .route("/master/delete", post(auth::delete_master));

    let members = Router::new()
        .route("/ticket/create", post(tickets::create))
        .route("/ticket/remove", post(tickets::remove))
        .route("/ticket/count", get(tickets::count));

    let staff = Router::new()
        .route("/user/fetch", get(users::fetch))
        .route("/user/create", post(users::create))
        .route("/user/delete", post(users::delete))
        .route("/ticket/fetch", get(tickets::fetch))
        .route("/ticket/info", get(tickets::info))
        .route("/ticket/edit", post(tickets::edit))
        .route("/ticket/update", post(tickets::update))
        .route_layer(from_fn_with_state(RequiredRoles(STAFF), require_roles));

    let protected = members
        .merge(staff)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Layers run bottom-up: rate limit first, then validation.
    let api = public
        .merge(protected)
        .layer(from_fn(validate_request))
        .layer(from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}
