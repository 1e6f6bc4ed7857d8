//! Authentication request handlers.

use astro_core::auth::jwt::IssuedTokens;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{AppJson, ClientInfo, bearer_token};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{OkResponse, TokenResponse};
use crate::services::auth;
use crate::services::cookies::{clear_refresh_cookie, read_refresh_token, refresh_cookie};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub organization_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub ok: bool,
    pub revoked_sessions: u64,
}

fn with_cookie(
    state: &AppState,
    jar: CookieJar,
    tokens: &IssuedTokens,
) -> (CookieJar, Json<TokenResponse>) {
    let cookie = refresh_cookie(
        &state.config.refresh_cookie,
        &tokens.refresh_token,
        tokens.refresh_expires_at,
    );
    (jar.add(cookie), Json(TokenResponse::from(tokens)))
}

/// `POST /auth/register`: create a user and its organization.
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ClientInfo(client): ClientInfo,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let tokens = auth::register(
        &state,
        &body.email,
        &body.password,
        &body.organization_name,
        &client,
    )
    .await?;
    Ok(with_cookie(&state, jar, &tokens))
}

/// `POST /auth/login`: authenticate with email and password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ClientInfo(client): ClientInfo,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let tokens = auth::login(&state, &body.email, &body.password, &client).await?;
    Ok(with_cookie(&state, jar, &tokens))
}

/// `POST /auth/refresh`: rotate the refresh cookie and mint a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ClientInfo(client): ClientInfo,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let presented = read_refresh_token(&jar, &state.config.refresh_cookie);
    let tokens = auth::refresh(
        &state,
        presented.as_deref(),
        bearer_token(&headers),
        &client,
    )
    .await?;
    Ok(with_cookie(&state, jar, &tokens))
}

/// `POST /auth/logout`: revoke the presented session and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<OkResponse>) {
    let presented = read_refresh_token(&jar, &state.config.refresh_cookie);
    auth::logout(&state, presented.as_deref()).await;
    let jar = jar.add(clear_refresh_cookie(&state.config.refresh_cookie));
    (jar, Json(OkResponse::ok()))
}

/// `POST /auth/logout-all`: revoke every live session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutAllResponse>)> {
    let revoked = auth::logout_all(&state, user.user_id).await?;
    let jar = jar.add(clear_refresh_cookie(&state.config.refresh_cookie));
    Ok((
        jar,
        Json(LogoutAllResponse {
            ok: true,
            revoked_sessions: revoked,
        }),
    ))
}

/// `GET /auth/me`: identity carried by the access token.
pub async fn me_handler(
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        org_id: user.principal.org_id,
        email: user.principal.email.clone(),
        roles: user.principal.roles.codes(),
    })
}

/// `POST /auth/google/exchange`: sign in with a Google authorization code.
pub async fn google_exchange_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ClientInfo(client): ClientInfo,
    AppJson(body): AppJson<GoogleExchangeRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let tokens = auth::google_exchange(
        &state,
        &body.code,
        &body.code_verifier,
        &body.redirect_uri,
        body.nonce.as_deref(),
        &client,
    )
    .await?;
    Ok(with_cookie(&state, jar, &tokens))
}
