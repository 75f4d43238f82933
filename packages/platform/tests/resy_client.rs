use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{NaiveDate, TimeZone, Utc};
use cierge_platform::resy::{ResyClient, ResyConfig};
use cierge_platform::{BookingPlatform, BookingRequest, PlatformError, Slot};
use cierge_types::PlatformCredentials;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct FakeResy {
    book_forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    let api_key = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = headers
        .get("x-resy-auth-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    api_key == r#"ResyAPI api_key="test-key""# && token == "good-token" && agent.starts_with("Mozilla/5.0")
}

async fn user(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::from_u16(419).unwrap().into_response();
    }
    Json(json!({
        "payment_methods": [
            { "id": 11, "is_default": false },
            { "id": 77, "is_default": true }
        ]
    }))
    .into_response()
}

async fn find(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::from_u16(419).unwrap().into_response();
    }
    match query.get("venue_id").map(String::as_str) {
        Some("bad-day") => (StatusCode::BAD_REQUEST, "reservation day out of range").into_response(),
        Some("gateway") => StatusCode::BAD_GATEWAY.into_response(),
        Some("empty") => Json(json!({ "results": { "venues": [] } })).into_response(),
        _ => {
            assert_eq!(query.get("day").map(String::as_str), Some("2026-11-20"));
            assert_eq!(query.get("party_size").map(String::as_str), Some("2"));
            assert_eq!(query.get("lat").map(String::as_str), Some("0"));
            Json(json!({
                "results": { "venues": [ { "slots": [
                    { "config": { "token": "cfg-1900", "type": "Dining Room" },
                      "date": { "start": "2026-11-20 19:00:00", "end": "2026-11-20 21:00:00" } },
                    { "config": { "token": "cfg-1930", "type": "Bar" },
                      "date": { "start": "2026-11-20 19:30:00", "end": "2026-11-20 21:30:00" } }
                ] } ] }
            }))
            .into_response()
        }
    }
}

async fn details(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    assert_eq!(body["commit"], 1);
    assert_eq!(body["day"], "2026-11-20");
    let config_id = body["config_id"].as_str().unwrap_or_default();
    Json(json!({
        "book_token": { "value": format!("bt-{}", config_id), "date_expires": "2026-11-06 14:05:00" },
        "user": { "payment_methods": [] }
    }))
}

async fn book(
    State(state): State<FakeResy>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = form.get("book_token").cloned().unwrap_or_default();
    state.book_forms.lock().push(form);
    match token.as_str() {
        "bt-cfg-taken" => StatusCode::NOT_FOUND.into_response(),
        "bt-cfg-deposit" => StatusCode::PAYMENT_REQUIRED.into_response(),
        _ => (
            StatusCode::CREATED,
            Json(json!({ "resy_token": "rt-123", "reservation_id": 9 })),
        )
            .into_response(),
    }
}

async fn spawn_fake() -> (String, FakeResy) {
    let state = FakeResy::default();
    let app = Router::new()
        .route("/2/user", get(user))
        .route("/4/find", get(find))
        .route("/3/details", post(details))
        .route("/3/book", post(book))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn client(base_url: &str, token: &str) -> ResyClient {
    let config = ResyConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
    };
    ResyClient::new(config, PlatformCredentials::new(token)).unwrap()
}

fn request(venue: &str) -> BookingRequest {
    BookingRequest {
        venue_id: venue.to_string(),
        reservation_date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
        party_size: 2,
        drop_time: Utc.with_ymd_and_hms(2026, 11, 6, 14, 0, 0).unwrap(),
    }
}

fn slot(token: &str) -> Slot {
    Slot {
        config_token: token.to_string(),
        start: NaiveDate::from_ymd_opt(2026, 11, 20)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap(),
        kind: None,
    }
}

#[tokio::test]
async fn search_parses_slots_with_wall_times() {
    let (base, _) = spawn_fake().await;
    let slots = client(&base, "good-token").search(&request("1505")).await.unwrap();

    let times: Vec<String> = slots.iter().map(|s| s.time().format("%H:%M:%S").to_string()).collect();
    assert_eq!(times, vec!["19:00:00", "19:30:00"]);
    assert_eq!(slots[0].config_token, "cfg-1900");
    assert_eq!(slots[1].kind.as_deref(), Some("Bar"));
}

#[tokio::test]
async fn expired_token_maps_419_to_unauthorized() {
    let (base, _) = spawn_fake().await;
    let err = client(&base, "stale-token")
        .pre_check(&request("1505"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Unauthorized));
}

#[tokio::test]
async fn client_errors_keep_the_body() {
    let (base, _) = spawn_fake().await;
    let resy = client(&base, "good-token");

    let err = resy.search(&request("bad-day")).await.unwrap_err();
    assert!(matches!(err, PlatformError::BadRequest(ref body) if body.contains("out of range")));

    let err = resy.search(&request("gateway")).await.unwrap_err();
    assert!(matches!(err, PlatformError::BadGateway));

    assert!(resy.search(&request("empty")).await.unwrap().is_empty());
}

#[tokio::test]
async fn book_sends_default_payment_method_learned_in_pre_check() {
    let (base, fake) = spawn_fake().await;
    let resy = client(&base, "good-token");
    resy.pre_check(&request("1505")).await.unwrap();

    let attempt = resy.book(&request("1505"), &slot("cfg-1900")).await.unwrap();
    assert_eq!(attempt.confirmation["resy_token"], "rt-123");
    assert_eq!(attempt.reservation_time.format("%H:%M").to_string(), "19:00");

    let forms = fake.book_forms.lock();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["book_token"], "bt-cfg-1900");
    assert_eq!(forms[0]["struct_payment_method"], r#"{"id":77}"#);
    assert_eq!(forms[0]["source_id"], "resy.com-venue-details");
}

#[tokio::test]
async fn book_without_payment_method_omits_it() {
    let (base, fake) = spawn_fake().await;
    let resy = client(&base, "good-token");

    resy.book(&request("1505"), &slot("cfg-1900")).await.unwrap();
    assert!(!fake.book_forms.lock()[0].contains_key("struct_payment_method"));
}

#[tokio::test]
async fn vanished_slot_and_deposit_map_to_distinct_errors() {
    let (base, _) = spawn_fake().await;
    let resy = client(&base, "good-token");

    let err = resy.book(&request("1505"), &slot("cfg-taken")).await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound));

    let err = resy.book(&request("1505"), &slot("cfg-deposit")).await.unwrap_err();
    assert!(matches!(err, PlatformError::PaymentRequired));
}
