//! End-to-end flows against a real database. Skipped unless `DATABASE_URL`
//! points at a disposable PostgreSQL instance.

mod common;

use std::str::FromStr;

use astro_api::AppState;
use astro_core::billing::settlement::{SettlementOutcome, settle};
use astro_core::chat::sessions::find_session;
use astro_core::models::auth::Role;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use common::*;

const PASSWORD: &str = "correct-horse-battery-9";

struct Account {
    access_token: String,
    cookie: String,
}

fn unique_email(tag: &str) -> String {
    format!("{tag}-{}@example.com", Uuid::new_v4().simple())
}

async fn register(app: &Router, email: &str) -> Account {
    let req = json_request(
        "POST",
        "/auth/register",
        None,
        json!({ "email": email, "password": PASSWORD, "organizationName": "Test Org" }),
    );
    let resp = send(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = refresh_cookie_pair(&resp).expect("refresh cookie");
    let body = body_json(resp).await;
    Account {
        access_token: body["accessToken"].as_str().expect("token").to_owned(),
        cookie,
    }
}

async fn refresh(app: &Router, cookie: &str) -> (StatusCode, Value, Option<String>) {
    let mut req = empty_request("POST", "/auth/refresh", None);
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    let resp = send(app, req).await;
    let status = resp.status();
    let next = refresh_cookie_pair(&resp);
    (status, body_json(resp).await, next)
}

fn user_id_of(app_state: &AppState, access_token: &str) -> Uuid {
    let claims = app_state
        .tokens
        .verify_access_token(access_token)
        .expect("valid token");
    Uuid::parse_str(&claims.sub).expect("uuid subject")
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

#[tokio::test]
async fn registration_stores_bcrypt_hash_and_login_works() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let email = unique_email("reg");
    let account = register(&app, &email).await;

    let hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(user_id_of(&state, &account.access_token))
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert!(hash.starts_with("$2"), "expected bcrypt hash, got {hash}");
    assert_ne!(hash, PASSWORD);

    // The cookie's token hashes to exactly one live session of the new user.
    let plain = account.cookie.trim_start_matches("astro_refresh=");
    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_sessions WHERE refresh_token_hash = $1 AND user_id = $2 AND revoked_at IS NULL",
    )
    .bind(state.refresh_hasher.hash(plain))
    .bind(user_id_of(&state, &account.access_token))
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(live, 1);

    let resp = send(
        &app,
        json_request("POST", "/auth/login", None, json!({ "email": email.to_uppercase(), "password": PASSWORD })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(
        &app,
        json_request("POST", "/auth/login", None, json!({ "email": email, "password": "wrong-password-1" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_credentials");

    let resp = send(
        &app,
        json_request("POST", "/auth/register", None, json!({ "email": email, "password": PASSWORD, "organizationName": "Again" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "email_already_exists");
}

#[tokio::test]
async fn replayed_refresh_token_revokes_the_chain() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state);
    let account = register(&app, &unique_email("rot")).await;

    let (status, _, rotated) = refresh(&app, &account.cookie).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = rotated.expect("rotated cookie");
    assert_ne!(rotated, account.cookie);

    let (status, body, _) = refresh(&app, &account.cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "refresh_revoked");

    // The replay also killed the descendant.
    let (status, body, _) = refresh(&app, &rotated).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "refresh_revoked");
}

#[tokio::test]
async fn logout_revokes_the_presented_session() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state);
    let account = register(&app, &unique_email("out")).await;

    let mut req = empty_request("POST", "/auth/logout", None);
    req.headers_mut()
        .insert(header::COOKIE, account.cookie.parse().unwrap());
    assert_eq!(send(&app, req).await.status(), StatusCode::OK);

    let (status, body, _) = refresh(&app, &account.cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "refresh_revoked");
}

#[tokio::test]
async fn api_key_quota_is_enforced() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state);
    let account = register(&app, &unique_email("key")).await;

    let resp = send(
        &app,
        json_request(
            "POST",
            "/api-keys",
            Some(&account.access_token),
            json!({ "name": "ci", "scopes": [" Marketplace.Read ", "marketplace.read", ""], "dailyQuota": 2 }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["scopes"], json!(["marketplace.read"]));
    let key = created["secret"].as_str().unwrap().to_owned();
    assert!(key.starts_with("ak_live_"));

    for expected_used in 1..=2 {
        let mut req = empty_request("GET", "/v1/me", None);
        req.headers_mut().insert("x-api-key", key.parse().unwrap());
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-quota-daily"], "2");
        assert_eq!(resp.headers()["x-usage-daily"], expected_used.to_string().as_str());
    }

    let mut req = empty_request("GET", "/v1/me", None);
    req.headers_mut().insert("x-api-key", key.parse().unwrap());
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["quota"], 2);
    assert_eq!(body["used"], 3);

    let mut req = empty_request("GET", "/v1/me", None);
    let tampered = format!("{}x", key);
    req.headers_mut().insert("x-api-key", tampered.parse().unwrap());
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "invalid_api_key");
}

/// Register an astrologer, verify them, publish a Monday 09:00-17:00 slot and
/// activate the profile. Returns the astrologer's id and a token carrying the
/// astrologer role.
async fn onboard_astrologer(app: &Router, state: &AppState, price: &str) -> (Uuid, String) {
    let admin = bearer_for(state, Uuid::new_v4(), &[Role::Admin]);
    let astrologer = register(app, &unique_email("astro")).await;
    let astrologer_id = user_id_of(state, &astrologer.access_token);

    let resp = send(
        app,
        json_request(
            "POST",
            "/astrologers/apply",
            Some(&astrologer.access_token),
            json!({ "displayName": "Meera", "experienceYears": 7, "languages": ["hindi"], "pricePerMinute": price }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let uri = format!("/admin/astrologers/{astrologer_id}/verify");
    assert_eq!(send(app, empty_request("POST", &uri, Some(&admin))).await.status(), StatusCode::OK);
    let resp = send(app, empty_request("POST", &uri, Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["status"], "verified");

    // The astrologer role arrives with the next refresh.
    let (status, body, _) = refresh(app, &astrologer.cookie).await;
    assert_eq!(status, StatusCode::OK);
    let astro_token = body["accessToken"].as_str().unwrap().to_owned();

    let resp = send(
        app,
        json_request(
            "POST",
            "/astrologers/me/availability",
            Some(&astro_token),
            json!({ "dayOfWeek": 1, "startTime": "09:00", "endTime": "17:00" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = send(app, empty_request("POST", "/astrologers/me/activate", Some(&astro_token))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    (astrologer_id, astro_token)
}

fn booking_request(consumer_token: &str, astrologer_id: Uuid, start: &str, minutes: i64) -> Request<Body> {
    json_request(
        "POST",
        "/chat/sessions",
        Some(consumer_token),
        json!({ "astrologerId": astrologer_id, "scheduledStartUtc": start, "durationMinutes": minutes }),
    )
}

/// Consumer books a Monday slot with a freshly onboarded astrologer, the
/// session runs to completion, and the ledger settles exactly once.
#[tokio::test]
async fn booking_lifecycle_settles_once() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let consumer = register(&app, &unique_email("consumer")).await;
    let (astrologer_id, astro_token) = onboard_astrologer(&app, &state, "10.00").await;

    // 2026-03-02 is a Monday.
    let book = |start: &str| booking_request(&consumer.access_token, astrologer_id, start, 30);
    let resp = send(&app, book("2026-03-02T10:00:00Z")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["status"], "requested");
    let session_id = created["chatSessionId"].as_str().unwrap().to_owned();

    let resp = send(&app, book("2026-03-02T10:15:00Z")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "slot_already_booked");

    // Windows are half-open: back-to-back bookings on either side fit.
    assert_eq!(send(&app, book("2026-03-02T09:30:00Z")).await.status(), StatusCode::CREATED);
    assert_eq!(send(&app, book("2026-03-02T10:30:00Z")).await.status(), StatusCode::CREATED);

    let resp = send(&app, book("2026-03-03T10:00:00Z")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "outside_availability");

    // Only the astrologer may accept.
    let accept = format!("/chat/sessions/{session_id}/accept");
    let resp = send(&app, empty_request("POST", &accept, Some(&consumer.access_token))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = send(&app, empty_request("POST", &accept, Some(&astro_token))).await;
    assert_eq!(body_json(resp).await, json!({ "ok": true, "status": "accepted" }));

    let resp = send(
        &app,
        json_request(
            "POST",
            &format!("/chat/sessions/{session_id}/messages"),
            Some(&consumer.access_token),
            json!({ "messageText": "  hello  " }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["messageText"], "hello");

    let start = format!("/chat/sessions/{session_id}/start");
    let resp = send(&app, empty_request("POST", &start, Some(&astro_token))).await;
    assert_eq!(body_json(resp).await["status"], "active");

    let end = format!("/chat/sessions/{session_id}/end");
    let resp = send(&app, empty_request("POST", &end, Some(&consumer.access_token))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ended = body_json(resp).await;
    assert_eq!(ended["status"], "ended");
    assert_eq!(ended["settlement"]["alreadySettled"], false);
    assert_eq!(decimal(&ended["settlement"]["estimate"]["totalAmount"]), Decimal::new(30000, 2));

    let resp = send(&app, empty_request("POST", &end, Some(&consumer.access_token))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "cannot_end");

    // A second settlement attempt writes nothing.
    let session = find_session(&state.pool, Uuid::parse_str(&session_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    let outcome = settle(&state.pool, &session, "INR").await.unwrap();
    assert_eq!(outcome, SettlementOutcome::AlreadySettled);

    let balance = |token: &str| {
        empty_request("GET", "/billing/me/balance?currency=inr", Some(token))
    };
    let resp = send(&app, balance(&consumer.access_token)).await;
    let body = body_json(resp).await;
    assert_eq!(body["currency"], "INR");
    assert_eq!(decimal(&body["balance"]), Decimal::new(-30000, 2));

    let resp = send(&app, balance(&astro_token)).await;
    assert_eq!(decimal(&body_json(resp).await["balance"]), Decimal::new(21000, 2));

    // Payouts are capped by the available balance.
    let payout = |amount: &str| {
        json_request(
            "POST",
            "/billing/payouts/request",
            Some(&astro_token),
            json!({ "amount": amount, "currency": "INR" }),
        )
    };
    let resp = send(&app, payout("250.00")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"], "insufficient_balance");

    let resp = send(&app, payout("200.00")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = send(&app, payout("20.00")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn price_above_cap_is_rejected_and_capped_price_settles() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let applicant = register(&app, &unique_email("greedy")).await;
    let resp = send(
        &app,
        json_request(
            "POST",
            "/astrologers/apply",
            Some(&applicant.access_token),
            json!({ "displayName": "Greedy", "pricePerMinute": "9000000000.00" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_price");

    // The highest accepted price over the longest session still settles.
    let consumer = register(&app, &unique_email("consumer")).await;
    let (astrologer_id, astro_token) = onboard_astrologer(&app, &state, "99999.99").await;

    let resp = send(
        &app,
        json_request("PUT", "/astrologers/me/price", Some(&astro_token), json!({ "pricePerMinute": "100000.00" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_price");

    let resp = send(&app, booking_request(&consumer.access_token, astrologer_id, "2026-03-02T09:00:00Z", 240)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session_id = body_json(resp).await["chatSessionId"].as_str().unwrap().to_owned();

    for action in ["accept", "start"] {
        let uri = format!("/chat/sessions/{session_id}/{action}");
        assert_eq!(send(&app, empty_request("POST", &uri, Some(&astro_token))).await.status(), StatusCode::OK);
    }
    let uri = format!("/chat/sessions/{session_id}/end");
    let resp = send(&app, empty_request("POST", &uri, Some(&astro_token))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ended = body_json(resp).await;
    assert_eq!(ended["status"], "ended");
    assert_eq!(
        decimal(&ended["settlement"]["estimate"]["totalAmount"]),
        Decimal::from_str("23999997.60").unwrap()
    );
}

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_with_one_token_rotate_once() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let account = register(&app, &unique_email("race")).await;
    let user_id = user_id_of(&state, &account.access_token);

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let app = app.clone();
            let cookie = account.cookie.clone();
            tokio::spawn(async move { refresh(&app, &cookie).await.0 })
        })
        .collect();
    let mut successes = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            successes += 1;
        } else {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
    assert_eq!(successes, 1);

    // A late racer counts as reuse and may revoke the winner's chain too.
    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_sessions WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert!(live <= 1, "expected at most one live session, found {live}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_into_one_window_admit_one() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let (astrologer_id, _) = onboard_astrologer(&app, &state, "10.00").await;
    let mut consumers = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        consumers.push(register(&app, &unique_email("racer")).await.access_token);
    }

    let handles: Vec<_> = consumers
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let app = app.clone();
            // Staggered starts that all overlap 11:00-11:30.
            let start = format!("2026-03-02T11:{:02}:00Z", i % 4 * 5);
            let req = booking_request(token, astrologer_id, &start, 30);
            tokio::spawn(async move {
                let resp = send(&app, req).await;
                let status = resp.status();
                (status, body_json(resp).await)
            })
        })
        .collect();
    let mut created = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["error"], "slot_already_booked");
        }
    }
    assert_eq!(created, 1);

    let booked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chat_sessions WHERE astrologer_id = $1",
    )
    .bind(astrologer_id)
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(booked, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ends_settle_exactly_once() {
    let Some(state) = database_state().await else {
        return;
    };
    let app = astro_api::router(state.clone());
    let consumer = register(&app, &unique_email("consumer")).await;
    let (astrologer_id, astro_token) = onboard_astrologer(&app, &state, "10.00").await;

    let resp = send(&app, booking_request(&consumer.access_token, astrologer_id, "2026-03-02T14:00:00Z", 20)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session_id = body_json(resp).await["chatSessionId"].as_str().unwrap().to_owned();
    for action in ["accept", "start"] {
        let uri = format!("/chat/sessions/{session_id}/{action}");
        assert_eq!(send(&app, empty_request("POST", &uri, Some(&astro_token))).await.status(), StatusCode::OK);
    }

    let uri = format!("/chat/sessions/{session_id}/end");
    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let app = app.clone();
            let token = if i % 2 == 0 { consumer.access_token.clone() } else { astro_token.clone() };
            let req = empty_request("POST", &uri, Some(&token));
            tokio::spawn(async move { send(&app, req).await.status() })
        })
        .collect();
    let mut ended = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            ended += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
        }
    }
    assert_eq!(ended, 1);

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ledger_transactions WHERE chat_session_id = $1",
    )
    .bind(Uuid::parse_str(&session_id).unwrap())
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(rows, 3);
}
