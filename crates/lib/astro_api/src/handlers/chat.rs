//! Chat session booking, lifecycle transitions, and messages.

use astro_core::billing::settlement::SettlementOutcome;
use astro_core::chat::booking::parse_utc_instant;
use astro_core::chat::messages;
use astro_core::chat::sessions::{self, NewBooking};
use astro_core::models::auth::Role;
use astro_core::models::billing::Estimate;
use astro_core::models::chat::{ChatMessageRecord, ChatSessionRecord, ChatStatus};
use astro_core::models::clamp_take;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::StatusResponse;

const DEFAULT_SESSION_TAKE: i64 = 50;
const MAX_SESSION_TAKE: i64 = 200;
const DEFAULT_MESSAGE_TAKE: i64 = 100;
const MAX_MESSAGE_TAKE: i64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub astrologer_id: Uuid,
    pub scheduled_start_utc: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub chat_session_id: Uuid,
    pub status: ChatStatus,
}

#[derive(Debug, Deserialize)]
pub struct TakeQuery {
    pub take: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message_text: String,
}

/// Ledger effect of ending a session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSummary {
    pub already_settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<Estimate>,
}

impl From<SettlementOutcome> for SettlementSummary {
    fn from(outcome: SettlementOutcome) -> Self {
        match outcome {
            SettlementOutcome::Recorded(estimate) => Self {
                already_settled: false,
                estimate: Some(estimate),
            },
            SettlementOutcome::AlreadySettled => Self {
                already_settled: true,
                estimate: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub ok: bool,
    pub status: ChatStatus,
    pub settlement: SettlementSummary,
}

/// `POST /chat/sessions` (consumer)
pub async fn create_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<CreateSessionResponse>)> {
    user.require_role(Role::Consumer)?;
    let booking = NewBooking {
        consumer_id: user.user_id,
        astrologer_id: body.astrologer_id,
        start: parse_utc_instant(&body.scheduled_start_utc)?,
        duration_minutes: body.duration_minutes,
        notes: body.notes,
    };
    let session = sessions::create_session(&state.pool, &booking).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            chat_session_id: session.id,
            status: session.status,
        }),
    ))
}

/// `GET /chat/sessions/me`: sessions the caller takes part in, newest first.
pub async fn my_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<TakeQuery>,
) -> AppResult<Json<Vec<ChatSessionRecord>>> {
    let take = clamp_take(query.take, DEFAULT_SESSION_TAKE, MAX_SESSION_TAKE);
    let list = sessions::list_for_user(&state.pool, user.user_id, take).await?;
    Ok(Json(list))
}

/// `GET /chat/sessions/{id}`
pub async fn get_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
) -> AppResult<Json<ChatSessionRecord>> {
    let session = sessions::get_for_participant(&state.pool, session_id, user.user_id).await?;
    Ok(Json(session))
}

/// `POST /chat/sessions/{id}/accept` (astrologer of the session)
pub async fn accept_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    user.require_role(Role::Astrologer)?;
    let session = sessions::accept(&state.pool, session_id, user.user_id).await?;
    Ok(Json(session.status.into()))
}

/// `POST /chat/sessions/{id}/start`
pub async fn start_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    let session = sessions::start(&state.pool, session_id, user.user_id).await?;
    Ok(Json(session.status.into()))
}

/// `POST /chat/sessions/{id}/cancel`
pub async fn cancel_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    let session = sessions::cancel(&state.pool, session_id, user.user_id).await?;
    Ok(Json(session.status.into()))
}

/// `POST /chat/sessions/{id}/end`: ends and settles in one step.
pub async fn end_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
) -> AppResult<Json<EndSessionResponse>> {
    let (session, outcome) = sessions::end(
        &state.pool,
        session_id,
        user.user_id,
        &state.config.default_currency,
    )
    .await?;
    Ok(Json(EndSessionResponse {
        ok: true,
        status: session.status,
        settlement: outcome.into(),
    }))
}

/// `GET /chat/sessions/{id}/messages?take=N`, oldest first.
pub async fn list_messages_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<TakeQuery>,
) -> AppResult<Json<Vec<ChatMessageRecord>>> {
    let take = clamp_take(query.take, DEFAULT_MESSAGE_TAKE, MAX_MESSAGE_TAKE);
    let list = messages::list_messages(&state.pool, session_id, user.user_id, take).await?;
    Ok(Json(list))
}

/// `POST /chat/sessions/{id}/messages`
pub async fn send_message_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(session_id): AppPath<Uuid>,
    AppJson(body): AppJson<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ChatMessageRecord>)> {
    let text = messages::validate_message(&body.message_text)?;
    let message = messages::send_message(&state.pool, session_id, user.user_id, text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_settlement_reports_already_settled() {
        let body = serde_json::to_value(SettlementSummary::from(SettlementOutcome::AlreadySettled))
            .unwrap();
        assert_eq!(body, serde_json::json!({ "alreadySettled": true }));
    }
}
