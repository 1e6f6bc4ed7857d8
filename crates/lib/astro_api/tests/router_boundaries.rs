//! Router behaviour that is decided before any database access.

mod common;

use astro_core::models::auth::Role;
use axum::http::{StatusCode, header};
use serde_json::json;
use uuid::Uuid;

use common::*;

#[tokio::test]
async fn refresh_without_cookie_is_rejected() {
    let app = offline_app();
    let resp = send(&app, empty_request("POST", "/auth/refresh", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "missing_refresh_cookie");
}

#[tokio::test]
async fn logout_without_cookie_succeeds_and_clears_cookie() {
    let app = offline_app();
    let resp = send(&app, empty_request("POST", "/auth/logout", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cleared = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with("astro_refresh=") && v.contains("Max-Age=0") && v.contains("Path=/auth"));
    assert!(cleared, "logout must expire the refresh cookie");
    assert_eq!(body_json(resp).await, json!({ "ok": true }));
}

#[tokio::test]
async fn me_requires_bearer() {
    let app = offline_app();
    let resp = send(&app, empty_request("GET", "/auth/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "missing_token");

    let resp = send(&app, empty_request("GET", "/auth/me", Some("not-a-jwt"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_token");
}

#[tokio::test]
async fn me_answers_from_token_claims() {
    let state = offline_state();
    let user_id = Uuid::new_v4();
    let token = bearer_for(&state, user_id, &[Role::Consumer, Role::Admin]);
    let app = astro_api::router(state);

    let resp = send(&app, empty_request("GET", "/auth/me", Some(&token))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["userId"], user_id.to_string());
    assert_eq!(body["email"], "someone@example.com");
    assert_eq!(body["roles"], json!(["consumer", "admin"]));
    assert!(body["orgId"].is_string());
}

#[tokio::test]
async fn register_rejects_malformed_email_before_storage() {
    let app = offline_app();
    let req = json_request(
        "POST",
        "/auth/register",
        None,
        json!({ "email": "not-an-email", "password": "long-enough-pass", "organizationName": "Acme" }),
    );
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");
}

#[tokio::test]
async fn malformed_json_uses_error_shape() {
    let app = offline_app();
    let req = json_request("POST", "/auth/login", None, json!({ "email": "a@b.co" }));
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_body");
}

#[tokio::test]
async fn google_exchange_unavailable_when_unconfigured() {
    let app = offline_app();
    let req = json_request(
        "POST",
        "/auth/google/exchange",
        None,
        json!({ "code": "c", "codeVerifier": "v", "redirectUri": "https://app.example.com/cb" }),
    );
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "google_not_configured");
}

#[tokio::test]
async fn machine_routes_require_api_key() {
    let app = offline_app();
    let resp = send(&app, empty_request("GET", "/v1/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "missing_api_key");

    let mut req = empty_request("GET", "/v1/me", None);
    req.headers_mut()
        .insert("x-api-key", "no-separator-here".parse().unwrap());
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_api_key_format");
}

#[tokio::test]
async fn booking_input_is_validated() {
    let state = offline_state();
    let token = bearer_for(&state, Uuid::new_v4(), &[Role::Consumer]);
    let app = astro_api::router(state);
    let astrologer = Uuid::new_v4();

    let cases = [
        (json!({ "astrologerId": astrologer, "scheduledStartUtc": "2026-03-02T10:00:00+05:30", "durationMinutes": 30 }), "start_must_be_utc"),
        (json!({ "astrologerId": astrologer, "scheduledStartUtc": "2026-03-02T10:00:00Z", "durationMinutes": 4 }), "invalid_duration"),
        (json!({ "astrologerId": astrologer, "scheduledStartUtc": "2026-03-02T10:00:00Z", "durationMinutes": 241 }), "invalid_duration"),
        (json!({ "astrologerId": astrologer, "scheduledStartUtc": "2026-03-02T23:30:00Z", "durationMinutes": 60 }), "cross_midnight_not_supported"),
    ];
    for (body, code) in cases {
        let resp = send(&app, json_request("POST", "/chat/sessions", Some(&token), body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{code}");
        assert_eq!(body_json(resp).await["error"], code);
    }
}

#[tokio::test]
async fn role_gates_return_forbidden() {
    let state = offline_state();
    let astrologer_only = bearer_for(&state, Uuid::new_v4(), &[Role::Astrologer]);
    let consumer = bearer_for(&state, Uuid::new_v4(), &[Role::Consumer]);
    let app = astro_api::router(state);

    let booking = json!({
        "astrologerId": Uuid::new_v4(),
        "scheduledStartUtc": "2026-03-02T10:00:00Z",
        "durationMinutes": 30
    });
    let resp = send(&app, json_request("POST", "/chat/sessions", Some(&astrologer_only), booking)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(&app, empty_request("GET", "/admin/payouts", Some(&consumer))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "forbidden");
}

#[tokio::test]
async fn usage_range_is_validated() {
    let state = offline_state();
    let token = bearer_for(&state, Uuid::new_v4(), &[Role::Consumer]);
    let app = astro_api::router(state);

    let resp = send(
        &app,
        empty_request("GET", "/usage/daily?from=2026-03-10&to=2026-03-01", Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_range");
}

#[tokio::test]
async fn message_text_is_validated() {
    let state = offline_state();
    let token = bearer_for(&state, Uuid::new_v4(), &[Role::Consumer]);
    let app = astro_api::router(state);
    let uri = format!("/chat/sessions/{}/messages", Uuid::new_v4());

    let resp = send(&app, json_request("POST", &uri, Some(&token), json!({ "messageText": "   " }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_message");
}

#[tokio::test]
async fn oversized_price_is_rejected_before_storage() {
    let state = offline_state();
    let consumer = bearer_for(&state, Uuid::new_v4(), &[Role::Consumer]);
    let astrologer = bearer_for(&state, Uuid::new_v4(), &[Role::Astrologer]);
    let app = astro_api::router(state);

    let resp = send(
        &app,
        json_request(
            "POST",
            "/astrologers/apply",
            Some(&consumer),
            json!({ "displayName": "Meera", "experienceYears": 7, "pricePerMinute": "9000000000.00" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_price");

    let resp = send(
        &app,
        json_request(
            "PUT",
            "/astrologers/me/price",
            Some(&astrologer),
            json!({ "pricePerMinute": "100000.00" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_price");
}
