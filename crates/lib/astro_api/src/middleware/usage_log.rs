//! Request log for the metered surfaces. Wraps the whole pipeline, so rejected
//! requests are logged too. Writes happen off the request path and failures
//! are only traced.

use std::time::Instant;

use astro_core::auth::usage::{append_log, should_log_path};
use astro_core::models::auth::UsageLogEntry;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::AppState;
use crate::extract::client_ip;

/// Who made the request, as established by the auth layers. Set on the
/// response so the outer logging layer can read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub api_key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

pub async fn log_usage(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if !should_log_path(&path) {
        return next.run(request).await;
    }
    let method = request.method().to_string();
    let ip_address = client_ip(request.extensions());
    let started = Instant::now();

    let response = next.run(request).await;

    let caller = response
        .extensions()
        .get::<CallerIdentity>()
        .copied()
        .unwrap_or_default();
    let entry = UsageLogEntry {
        api_key_id: caller.api_key_id,
        user_id: caller.user_id,
        method,
        path,
        status_code: i32::from(response.status().as_u16()),
        duration_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        ip_address,
    };
    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = append_log(&pool, &entry).await {
            warn!(path = %entry.path, error = %e, "failed to append usage log");
        }
    });

    response
}
