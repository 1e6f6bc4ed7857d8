//! Admin-only operations: astrologer verification and payout review.

use astro_core::billing::{estimate, ledger, payouts};
use astro_core::marketplace::profiles;
use astro_core::models::auth::Role;
use astro_core::models::billing::{Balance, PayoutRecord, PayoutStatus};
use astro_core::models::clamp_take;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::astrologers::ProfileResponse;
use super::billing::CurrencyQuery;
use crate::AppState;
use crate::error::AppResult;
use crate::extract::{AppPath, AppQuery};
use crate::middleware::auth::AuthenticatedUser;

const DEFAULT_PAYOUT_TAKE: i64 = 100;
const MAX_PAYOUT_TAKE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct PayoutListQuery {
    pub status: Option<PayoutStatus>,
    pub take: Option<i64>,
}

/// `POST /admin/astrologers/{id}/verify`
pub async fn verify_astrologer_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(astrologer_id): AppPath<Uuid>,
) -> AppResult<Json<ProfileResponse>> {
    user.require_role(Role::Admin)?;
    let profile = profiles::verify(&state.pool, astrologer_id).await?;
    Ok(Json(profile.into()))
}

/// `GET /admin/payouts?status=&take=`
pub async fn list_payouts_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<PayoutListQuery>,
) -> AppResult<Json<Vec<PayoutRecord>>> {
    user.require_role(Role::Admin)?;
    let take = clamp_take(query.take, DEFAULT_PAYOUT_TAKE, MAX_PAYOUT_TAKE);
    let list = payouts::list_all(&state.pool, query.status, take).await?;
    Ok(Json(list))
}

/// `POST /admin/payouts/{id}/mark-paid`
pub async fn mark_payout_paid_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(payout_id): AppPath<Uuid>,
) -> AppResult<Json<PayoutRecord>> {
    user.require_role(Role::Admin)?;
    let payout = payouts::mark_paid(&state.pool, payout_id).await?;
    info!(%payout_id, admin_id = %user.user_id, "payout marked paid");
    Ok(Json(payout))
}

/// `POST /admin/payouts/{id}/reject`
pub async fn reject_payout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(payout_id): AppPath<Uuid>,
) -> AppResult<Json<PayoutRecord>> {
    user.require_role(Role::Admin)?;
    let payout = payouts::reject(&state.pool, payout_id).await?;
    info!(%payout_id, admin_id = %user.user_id, "payout rejected");
    Ok(Json(payout))
}

/// `GET /admin/billing/platform/balance?currency=`
pub async fn platform_balance_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<CurrencyQuery>,
) -> AppResult<Json<Balance>> {
    user.require_role(Role::Admin)?;
    let currency =
        estimate::normalize_currency(query.currency.as_deref(), &state.config.default_currency)?;
    let balance = ledger::platform_balance(&state.pool, &currency).await?;
    Ok(Json(Balance {
        user_id: None,
        currency,
        balance,
    }))
}
