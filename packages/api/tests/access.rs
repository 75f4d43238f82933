//! Bearer access tokens and the job creation rate limit.

mod common;

use chrono::Utc;
use cierge_platform::testing::ScriptedPlatform;
use cierge_types::Platform;
use common::{JWT_SECRET, USER, spawn};
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_requires_a_token() {
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;

    let response = server
        .client
        .get(server.url("/api/job/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = server
        .client
        .get(server.url("/api/job/list"))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = server.get("/api/job/list").await;
    assert_eq!(status, StatusCode::OK);

    let health = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_token_is_rejected() {
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;
    let issued = server.state.access.issue(USER).await.unwrap();
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": USER,
        "jti": issued.jti,
        "iat": now - 7200,
        "exp": now - 3600,
    });
    let stale = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();

    let response = server
        .client
        .get(server.url("/api/job/list"))
        .bearer_auth(stale)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_revokes_the_token() {
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;

    let (status, body) = server.post("/api/auth/logout", json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["revoked"], true);

    let (status, _) = server.get("/api/job/list").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login is unaffected.
    let fresh = server.state.access.issue(USER).await.unwrap();
    let response = server
        .client
        .get(server.url("/api/job/list"))
        .bearer_auth(fresh.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_creation_is_rate_limited_per_user() {
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;
    let bad_party = json!({
        "restaurant_id": "00000000-0000-0000-0000-000000000000",
        "drop_config_id": "00000000-0000-0000-0000-000000000000",
        "reservation_date": "2030-01-01",
        "party_size": 0,
        "preferred_times": ["19:00"]
    });

    for _ in 0..3 {
        let (status, body) = server.post("/api/job", bad_party.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
    let (status, body) = server.post("/api/job", bad_party.clone()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{body}");

    // Other users have their own budget.
    let other = server.state.access.issue("user-2").await.unwrap();
    let response = server
        .client
        .post(server.url("/api/job"))
        .bearer_auth(other.token)
        .json(&bad_party)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Reads are not limited.
    let (status, _) = server.get("/api/job/list").await;
    assert_eq!(status, StatusCode::OK);
}
