//! # astro_api
//!
//! HTTP API library for Astro: account and session endpoints, the API key
//! gateway, the consultation marketplace, and billing.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use astro_core::auth::AuthError;
use astro_core::auth::google::GoogleVerifier;
use astro_core::auth::jwt::TokenIssuer;
use astro_core::auth::refresh::RefreshTokenHasher;
use axum::Router;
use axum::routing::{delete, get, post, put};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, api_keys, astrologers, auth, billing, chat, usage, v1};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub pool: PgPool,
    /// API configuration.
    pub config: ApiConfig,
    pub tokens: Arc<TokenIssuer>,
    pub refresh_hasher: Arc<RefreshTokenHasher>,
    pub google: Arc<GoogleVerifier>,
}

impl AppState {
    /// Build the state, deriving signing and hashing keys from `config`.
    pub fn new(pool: PgPool, config: ApiConfig) -> Result<Self, AuthError> {
        let refresh_hasher = RefreshTokenHasher::new(config.refresh_token_hash_key.as_bytes())?;
        Ok(Self {
            tokens: Arc::new(TokenIssuer::new(&config.jwt)),
            refresh_hasher: Arc::new(refresh_hasher),
            google: Arc::new(GoogleVerifier::new(config.google.clone())),
            pool,
            config,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `astro_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    astro_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/google/exchange", post(auth::google_exchange_handler))
        .route("/astrologers/{id}", get(astrologers::get_profile_handler))
        .route(
            "/astrologers/{id}/availability",
            get(astrologers::public_availability_handler),
        );

    // Bearer-authenticated routes
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route(
            "/api-keys",
            post(api_keys::create_api_key_handler).get(api_keys::list_api_keys_handler),
        )
        .route("/api-keys/{id}", delete(api_keys::revoke_api_key_handler))
        .route("/usage/daily", get(usage::daily_usage_handler))
        .route("/astrologers/apply", post(astrologers::apply_handler))
        .route("/astrologers/me/activate", post(astrologers::activate_handler))
        .route("/astrologers/me/price", put(astrologers::update_price_handler))
        .route(
            "/astrologers/me/availability",
            get(astrologers::my_availability_handler).post(astrologers::add_slot_handler),
        )
        .route(
            "/astrologers/me/availability/{id}",
            delete(astrologers::disable_slot_handler),
        )
        .route("/chat/sessions", post(chat::create_session_handler))
        .route("/chat/sessions/me", get(chat::my_sessions_handler))
        .route("/chat/sessions/{id}", get(chat::get_session_handler))
        .route("/chat/sessions/{id}/accept", post(chat::accept_session_handler))
        .route("/chat/sessions/{id}/start", post(chat::start_session_handler))
        .route("/chat/sessions/{id}/end", post(chat::end_session_handler))
        .route("/chat/sessions/{id}/cancel", post(chat::cancel_session_handler))
        .route(
            "/chat/sessions/{id}/messages",
            get(chat::list_messages_handler).post(chat::send_message_handler),
        )
        .route("/billing/sessions/{id}/estimate", get(billing::estimate_handler))
        .route("/billing/me/balance", get(billing::my_balance_handler))
        .route("/billing/me/ledger", get(billing::my_ledger_handler))
        .route("/billing/me/payouts", get(billing::my_payouts_handler))
        .route("/billing/payouts/request", post(billing::request_payout_handler))
        .route(
            "/admin/astrologers/{id}/verify",
            post(admin::verify_astrologer_handler),
        )
        .route("/admin/payouts", get(admin::list_payouts_handler))
        .route(
            "/admin/payouts/{id}/mark-paid",
            post(admin::mark_payout_paid_handler),
        )
        .route("/admin/payouts/{id}/reject", post(admin::reject_payout_handler))
        .route(
            "/admin/billing/platform/balance",
            get(admin::platform_balance_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // API-key routes: authenticate, then meter
    let machine = Router::new()
        .route("/v1/me", get(v1::me_handler))
        .route("/v1/usage/today", get(v1::usage_today_handler))
        .route(
            "/v1/astrologers/{id}/availability",
            get(v1::availability_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::quota::enforce_quota,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(machine)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::usage_log::log_usage,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
