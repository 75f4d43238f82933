//! Authentication of `POST /internal/job/status`.

mod common;

use chrono::Utc;
use cierge_platform::testing::ScriptedPlatform;
use cierge_types::{Outcome, Platform};
use common::{DropPlan, TestServer, spawn};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

async fn pending_job() -> (TestServer, String, String) {
    let plan = DropPlan::in_secs(3 * 3600);
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;
    let ids = server.seed(&plan, "resy-auth-token").await;
    let job = server.create_job(&plan, &ids).await;
    let job_id = job["id"].as_str().unwrap().to_string();
    let secret = server.callback_secret(&job_id).await;
    (server, job_id, secret)
}

async fn report(server: &TestServer, secret: Option<&str>, body: String) -> (StatusCode, Value) {
    let mut request = server
        .client
        .post(server.url("/internal/job/status"))
        .header("Content-Type", "application/json")
        .body(body);
    if let Some(secret) = secret {
        request = request.bearer_auth(secret);
    }
    let response = request.send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

fn failure(job_id: &str) -> String {
    let outcome = Outcome::failed(
        Uuid::parse_str(job_id).unwrap(),
        Utc::now(),
        "no slots matching the preferred times",
    );
    serde_json::to_string(&outcome).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_missing_or_wrong_credentials() {
    let (server, job_id, secret) = pending_job().await;

    let (status, _) = report(&server, None, failure(&job_id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = report(&server, Some("not-the-secret"), failure(&job_id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The right secret for an unknown job looks exactly like a wrong secret.
    let (status, unknown) = report(&server, Some(&secret), failure(&Uuid::new_v4().to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, wrong) = report(&server, Some("not-the-secret"), failure(&job_id)).await;
    assert_eq!(unknown, wrong);

    let (status, _) = report(&server, Some(&secret), json!({"success": false}).to_string()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, job) = server.get(&format!("/api/job/{}", job_id)).await;
    assert_eq!(job["status"], "scheduled");
    assert_eq!(job["callbacked"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_json_is_a_bad_request() {
    let (server, job_id, secret) = pending_job().await;

    let (status, _) = report(&server, Some(&secret), "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Authenticated, but not an outcome document.
    let (status, _) = report(&server, Some(&secret), json!({ "job_id": job_id }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, job) = server.get(&format!("/api/job/{}", job_id)).await;
    assert_eq!(job["callbacked"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accepts_exactly_one_report() {
    let (server, job_id, secret) = pending_job().await;

    let (status, body) = report(&server, Some(&secret), failure(&job_id)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["message"].as_str().unwrap().contains("failed"));

    let (_, job) = server.get(&format!("/api/job/{}", job_id)).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["callbacked"], true);
    assert_eq!(job["error_message"], "no slots matching the preferred times");

    let (status, _) = report(&server, Some(&secret), failure(&job_id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn secret_of_one_job_does_not_open_another() {
    let plan = DropPlan::in_secs(3 * 3600);
    let server = spawn(Arc::new(ScriptedPlatform::new(Platform::Resy))).await;
    let ids = server.seed(&plan, "resy-auth-token").await;
    let first = server.create_job(&plan, &ids).await;
    let second = server.create_job(&plan, &ids).await;
    let first_secret = server.callback_secret(first["id"].as_str().unwrap()).await;
    let second_id = second["id"].as_str().unwrap();

    let (status, _) = report(&server, Some(&first_secret), failure(second_id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, job) = server.get(&format!("/api/job/{}", second_id)).await;
    assert_eq!(job["callbacked"], false);
}
