//! Astrologer onboarding, public profiles, and weekly availability.

use astro_core::marketplace::availability::{self, parse_time_of_day};
use astro_core::marketplace::profiles::{self, ProfileApplication};
use astro_core::models::auth::Role;
use astro_core::models::marketplace::{AstrologerProfile, AstrologerStatus, AvailabilitySlot};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::OkResponse;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub experience_years: i32,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    pub price_per_minute: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSlotRequest {
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriceRequest {
    pub price_per_minute: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub astrologer_id: Uuid,
    pub display_name: String,
    pub bio: Option<String>,
    pub experience_years: i32,
    pub languages: Vec<String>,
    pub specializations: Vec<String>,
    pub price_per_minute: Decimal,
    pub platform_fee_pct: Decimal,
    pub status: AstrologerStatus,
    pub created_utc: DateTime<Utc>,
    pub verified_utc: Option<DateTime<Utc>>,
}

fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl From<AstrologerProfile> for ProfileResponse {
    fn from(p: AstrologerProfile) -> Self {
        Self {
            astrologer_id: p.astrologer_id,
            languages: split_csv(&p.languages_csv),
            specializations: split_csv(&p.specializations_csv),
            display_name: p.display_name,
            bio: p.bio,
            experience_years: p.experience_years,
            price_per_minute: p.price_per_minute,
            platform_fee_pct: p.platform_fee_pct,
            status: p.status,
            created_utc: p.created_at,
            verified_utc: p.verified_at,
        }
    }
}

/// Availability slot with `HH:MM` times.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotResponse {
    pub id: Uuid,
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub is_active: bool,
}

fn hh_mm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

impl From<AvailabilitySlot> for SlotResponse {
    fn from(s: AvailabilitySlot) -> Self {
        Self {
            id: s.id,
            day_of_week: s.day_of_week,
            start_time: hh_mm(s.start_time),
            end_time: hh_mm(s.end_time),
            is_active: s.is_active,
        }
    }
}

/// Active slots of an astrologer, for public and machine callers.
pub(crate) async fn public_slots(
    state: &AppState,
    astrologer_id: Uuid,
) -> AppResult<Vec<SlotResponse>> {
    if profiles::get_profile(&state.pool, astrologer_id).await?.is_none() {
        return Err(AppError::not_found("astrologer_not_found"));
    }
    let slots = availability::list_slots(&state.pool, astrologer_id, true).await?;
    Ok(slots.into_iter().map(SlotResponse::from).collect())
}

/// `POST /astrologers/apply` (consumer)
pub async fn apply_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<ApplyRequest>,
) -> AppResult<(StatusCode, Json<ProfileResponse>)> {
    user.require_role(Role::Consumer)?;
    let application = ProfileApplication {
        display_name: body.display_name,
        bio: body.bio,
        experience_years: body.experience_years,
        languages: body.languages,
        specializations: body.specializations,
        price_per_minute: body.price_per_minute,
    };
    let profile = profiles::apply(&state.pool, user.user_id, &application).await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

/// `POST /astrologers/me/activate` (astrologer)
pub async fn activate_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<ProfileResponse>> {
    user.require_role(Role::Astrologer)?;
    let profile = profiles::activate(&state.pool, user.user_id).await?;
    Ok(Json(profile.into()))
}

/// `PUT /astrologers/me/price` (astrologer)
pub async fn update_price_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<UpdatePriceRequest>,
) -> AppResult<Json<ProfileResponse>> {
    user.require_role(Role::Astrologer)?;
    let profile =
        profiles::update_price(&state.pool, user.user_id, body.price_per_minute).await?;
    Ok(Json(profile.into()))
}

/// `GET /astrologers/{id}`
pub async fn get_profile_handler(
    State(state): State<AppState>,
    AppPath(astrologer_id): AppPath<Uuid>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = profiles::get_profile(&state.pool, astrologer_id)
        .await?
        .ok_or_else(|| AppError::not_found("astrologer_not_found"))?;
    Ok(Json(profile.into()))
}

/// `GET /astrologers/{id}/availability`
pub async fn public_availability_handler(
    State(state): State<AppState>,
    AppPath(astrologer_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<SlotResponse>>> {
    Ok(Json(public_slots(&state, astrologer_id).await?))
}

/// `GET /astrologers/me/availability`, including disabled slots.
pub async fn my_availability_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<SlotResponse>>> {
    user.require_role(Role::Astrologer)?;
    let slots = availability::list_slots(&state.pool, user.user_id, false).await?;
    Ok(Json(slots.into_iter().map(SlotResponse::from).collect()))
}

/// `POST /astrologers/me/availability`
pub async fn add_slot_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<AddSlotRequest>,
) -> AppResult<(StatusCode, Json<SlotResponse>)> {
    user.require_role(Role::Astrologer)?;
    let start = parse_time_of_day(&body.start_time)
        .ok_or_else(|| AppError::validation("invalid_time_format"))?;
    let end = parse_time_of_day(&body.end_time)
        .ok_or_else(|| AppError::validation("invalid_time_format"))?;
    let slot =
        availability::add_slot(&state.pool, user.user_id, body.day_of_week, start, end).await?;
    Ok((StatusCode::CREATED, Json(slot.into())))
}

/// `DELETE /astrologers/me/availability/{id}`. Disables rather than deletes.
pub async fn disable_slot_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(slot_id): AppPath<Uuid>,
) -> AppResult<Json<OkResponse>> {
    user.require_role(Role::Astrologer)?;
    availability::disable_slot(&state.pool, user.user_id, slot_id).await?;
    Ok(Json(OkResponse::ok()))
}
