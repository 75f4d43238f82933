//! Full loop: HTTP job creation, local scheduler, in-process worker against a
//! scripted platform, authenticated callback, reconciliation.

mod common;

use cierge_platform::testing::{BookScript, ScriptedPlatform};
use cierge_scheduler::SchedulerBackend;
use cierge_types::Platform;
use common::{DropPlan, spawn};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn platform(plan: &DropPlan, times: &[&str]) -> ScriptedPlatform {
    ScriptedPlatform::new(Platform::Resy).release_at(plan.drop_at, plan.reservation_date, times)
}

fn logged_outcome(job: &Value) -> Value {
    serde_json::from_str(job["logs"].as_str().expect("outcome logs")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn happy_path_books_first_preference() {
    let plan = DropPlan::in_secs(4);
    let scripted = Arc::new(platform(&plan, &["19:00", "19:30"]));
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let job_id = job["id"].as_str().unwrap();
    assert_eq!(job["status"], "scheduled");
    let scheduled_at: chrono::DateTime<chrono::Utc> =
        job["scheduled_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(scheduled_at, plan.drop_at);
    assert!(job.get("callback_secret_hash").is_none());

    let done = server.wait_for_outcome(job_id).await;
    assert_eq!(done["status"], "success", "{done}");
    assert_eq!(done["reserved_time"], "19:00");

    let outcome = logged_outcome(&done);
    let drift = outcome["drift_ns"].as_i64().unwrap();
    assert!(drift >= 0, "booked {drift}ns before the drop");
    assert!(drift < 50_000_000, "drift {drift}ns");

    let (status, reservations) = server.get("/api/reservation/list").await;
    assert_eq!(status, StatusCode::OK);
    let reservations = reservations.as_array().unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0]["job_id"], job_id);

    let (_, configs) = server
        .get(&format!("/api/drop-config?restaurant_id={}", ids.0))
        .await;
    assert_eq!(configs[0]["restaurant_confidence"], 1);
    assert_eq!(scripted.seen_tokens(), vec!["resy-auth-token".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn preference_order_beats_platform_order() {
    let plan = DropPlan::in_secs(4);
    let scripted = Arc::new(platform(&plan, &["19:15", "19:00"]));
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let done = server.wait_for_outcome(job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "success", "{done}");
    assert_eq!(done["reserved_time"], "19:00");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vanished_first_preference_falls_through() {
    let plan = DropPlan::in_secs(4);
    let scripted = Arc::new(
        platform(&plan, &["19:00", "19:15"]).on_book("19:00", BookScript::NotFound),
    );
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let done = server.wait_for_outcome(job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "success", "{done}");
    assert_eq!(done["reserved_time"], "19:15");

    let booked: Vec<String> = scripted
        .booked_times()
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect();
    assert_eq!(booked, vec!["19:00", "19:15"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_matching_slot_fails_the_job() {
    let plan = DropPlan::in_secs(4);
    let scripted = Arc::new(platform(&plan, &["20:00"]));
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let done = server.wait_for_outcome(job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "failed");
    assert!(
        done["error_message"]
            .as_str()
            .unwrap()
            .contains("no slots matching the preferred times"),
        "{done}"
    );
    assert!(scripted.booked_times().is_empty());

    let (_, reservations) = server.get("/api/reservation/list").await;
    assert_eq!(reservations.as_array().unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replayed_callback_is_forbidden() {
    let plan = DropPlan::in_secs(4);
    let scripted = Arc::new(platform(&plan, &["19:00", "19:30"]));
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let job_id = job["id"].as_str().unwrap();
    let secret = server.callback_secret(job_id).await;

    let done = server.wait_for_outcome(job_id).await;
    assert_eq!(done["status"], "success", "{done}");

    let replay = server
        .client
        .post(server.url("/internal/job/status"))
        .bearer_auth(&secret)
        .header("Content-Type", "application/json")
        .body(done["logs"].as_str().unwrap().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::FORBIDDEN);

    let (_, after) = server.get(&format!("/api/job/{}", job_id)).await;
    assert_eq!(after, done);
    let (_, reservations) = server.get("/api/reservation/list").await;
    assert_eq!(reservations.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_job_never_runs() {
    let plan = DropPlan::in_secs(2 * 3600);
    let scripted = Arc::new(platform(&plan, &["19:00"]));
    let server = spawn(scripted.clone()).await;
    let ids = server.seed(&plan, "resy-auth-token").await;

    let job = server.create_job(&plan, &ids).await;
    let job_id = job["id"].as_str().unwrap();
    assert!(!server.scheduler.is_empty());

    let (status, cancelled) = server
        .post(&format!("/api/job/{}/cancel", job_id), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["status"], "cancelled");

    let entry = server
        .scheduler
        .get(Uuid::parse_str(job_id).unwrap())
        .await
        .unwrap();
    assert!(entry.is_none());

    // A second cancel is a conflict, not a silent success.
    let (status, _) = server
        .post(&format!("/api/job/{}/cancel", job_id), Value::Null)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scripted.pre_check_count(), 0);
    assert_eq!(scripted.search_count(), 0);

    let (_, upcoming) = server.get("/api/job/list?upcoming=true").await;
    assert_eq!(upcoming.as_array().unwrap().len(), 0);
    let (_, all) = server.get("/api/job/list").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}
