//! Estimates, balances, ledger history, and payout requests.

use astro_core::billing::{estimate, ledger, payouts};
use astro_core::chat::sessions;
use astro_core::models::billing::{Balance, Estimate, LedgerEntryRecord, PayoutRecord};
use astro_core::models::clamp_take;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::AuthenticatedUser;

const DEFAULT_LEDGER_TAKE: i64 = 50;
const MAX_LEDGER_TAKE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CurrencyQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub take: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `GET /billing/sessions/{id}/estimate` (participants)
pub async fn estimate_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<CurrencyQuery>,
) -> AppResult<Json<Estimate>> {
    let currency =
        estimate::normalize_currency(query.currency.as_deref(), &state.config.default_currency)?;
    let session = sessions::get_for_participant(&state.pool, session_id, user.user_id).await?;
    Ok(Json(estimate::estimate(&session, &currency)))
}

/// `GET /billing/me/balance?currency=`
pub async fn my_balance_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<CurrencyQuery>,
) -> AppResult<Json<Balance>> {
    let currency =
        estimate::normalize_currency(query.currency.as_deref(), &state.config.default_currency)?;
    let balance = ledger::user_balance(&state.pool, user.user_id, &currency).await?;
    Ok(Json(Balance {
        user_id: Some(user.user_id),
        currency,
        balance,
    }))
}

/// `GET /billing/me/ledger?take=N`, newest first.
pub async fn my_ledger_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<LedgerQuery>,
) -> AppResult<Json<Vec<LedgerEntryRecord>>> {
    let take = clamp_take(query.take, DEFAULT_LEDGER_TAKE, MAX_LEDGER_TAKE);
    let entries = ledger::list_for_user(&state.pool, user.user_id, take).await?;
    Ok(Json(entries))
}

/// `POST /billing/payouts/request`
pub async fn request_payout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<PayoutRequest>,
) -> AppResult<(StatusCode, Json<PayoutRecord>)> {
    let currency =
        estimate::normalize_currency(body.currency.as_deref(), &state.config.default_currency)?;
    let payout = payouts::request_payout(
        &state.pool,
        user.user_id,
        body.amount,
        &currency,
        body.notes.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

/// `GET /billing/me/payouts`
pub async fn my_payouts_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<PayoutRecord>>> {
    let list = payouts::list_for_user(&state.pool, user.user_id).await?;
    Ok(Json(list))
}
