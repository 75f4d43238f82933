#![allow(dead_code)]

use chrono::{DateTime, Days, NaiveDate, SubsecRound, Utc};
use chrono_tz::America::New_York;
use cierge_api::secret::SecretHasher;
use cierge_api::state::{AppState, State};
use cierge_api::{construct_router, db, dispatch::LocalWorkerHandler, token_store::TokenStore};
use cierge_envelope::{Envelope, LocalKeyService};
use cierge_platform::PlatformRegistry;
use cierge_platform::testing::ScriptedPlatform;
use cierge_scheduler::{LocalScheduler, SchedulerBackend};
use cierge_types::Platform;
use cierge_worker::{Worker, WorkerConfig};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const USER: &str = "user-1";
pub const JWT_SECRET: &str = "test-secret-test-secret-test-secret-test-secret-test-secret-1234";

/// Drop instant a few seconds (or hours) out, expressed the way a user
/// would configure it for a restaurant in New York.
#[derive(Debug, Clone)]
pub struct DropPlan {
    pub drop_at: DateTime<Utc>,
    pub drop_time: String,
    pub reservation_date: NaiveDate,
}

impl DropPlan {
    pub fn in_secs(secs: i64) -> Self {
        let drop_at = (Utc::now() + chrono::Duration::seconds(secs)).trunc_subsecs(0);
        let local = drop_at.with_timezone(&New_York);
        Self {
            drop_at,
            drop_time: local.format("%H:%M:%S").to_string(),
            reservation_date: local.date_naive() + Days::new(14),
        }
    }
}

pub struct TestServer {
    pub base: String,
    pub state: AppState,
    pub scheduler: Arc<LocalScheduler>,
    pub client: reqwest::Client,
    pub token: String,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn spawn(platform: Arc<ScriptedPlatform>) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let mut config = cierge_api::config::ServerConfig::default();
    config.server.endpoint = base.clone();
    config.auth.jwt_secret = JWT_SECRET.into();
    config.scheduler.cold_start_buffer = Duration::from_secs(1);
    config.worker.callback = true;

    let db = db::connect("sqlite::memory:", Duration::from_secs(10))
        .await
        .unwrap();
    let tokens = TokenStore::in_memory().await.unwrap();
    let envelope = Envelope::new(Arc::new(LocalKeyService::generate("e2e-1").unwrap()));
    let scheduler = Arc::new(LocalScheduler::new());

    let state: AppState = Arc::new(State::with_hasher(
        config,
        db,
        tokens,
        envelope.clone(),
        scheduler.clone(),
        SecretHasher::with_cost(256, 1, 1).unwrap(),
    ));

    let mut registry = PlatformRegistry::new();
    registry.register(Platform::Resy, platform.factory());
    let worker = Worker::new(
        envelope,
        registry,
        WorkerConfig {
            poll_interval_ms: 5,
            poll_window_secs: 2,
            callback_timeout_ms: 5_000,
            ..WorkerConfig::default()
        },
    );

    let shutdown = CancellationToken::new();
    let handler = LocalWorkerHandler::new(worker, state.jobs.clone(), shutdown.clone());
    scheduler.spawn(Arc::new(handler), shutdown.clone());

    let app = construct_router(state.clone());
    let stop = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
            .unwrap();
    });

    let token = state.access.issue(USER).await.unwrap().token;
    TestServer {
        base,
        state,
        scheduler,
        client: reqwest::Client::new(),
        token,
        shutdown,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let value = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, None).await
    }

    /// Restaurant, drop config and resy credentials for [`USER`]. Returns
    /// `(restaurant_id, drop_config_id)`.
    pub async fn seed(&self, plan: &DropPlan, auth_token: &str) -> (String, String) {
        let (status, restaurant) = self
            .post(
                "/api/restaurant",
                json!({
                    "platform": "resy",
                    "platform_id": "1505",
                    "name": "Don Angie",
                    "city": "New York",
                    "timezone": "America/New_York"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{restaurant}");
        let restaurant_id = restaurant["id"].as_str().unwrap().to_string();

        let (status, config) = self
            .post(
                "/api/drop-config",
                json!({
                    "restaurant_id": restaurant_id,
                    "days_in_advance": 14,
                    "drop_time": plan.drop_time,
                    "timezone": "America/New_York"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{config}");

        let (status, stored) = self
            .send(
                reqwest::Method::PUT,
                "/api/credentials/resy",
                Some(json!({ "auth_token": auth_token })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{stored}");

        (restaurant_id, config["id"].as_str().unwrap().to_string())
    }

    pub async fn create_job(&self, plan: &DropPlan, ids: &(String, String)) -> Value {
        let (status, job) = self
            .post(
                "/api/job",
                json!({
                    "restaurant_id": ids.0,
                    "drop_config_id": ids.1,
                    "reservation_date": plan.reservation_date,
                    "party_size": 2,
                    "preferred_times": ["19:00", "19:15"]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{job}");
        job
    }

    /// Plaintext callback secret of a job that has not fired yet.
    pub async fn callback_secret(&self, job_id: &str) -> String {
        let info = self
            .scheduler
            .get(Uuid::parse_str(job_id).unwrap())
            .await
            .unwrap()
            .expect("pending schedule");
        cierge_api::services::jobs::open_callback_secret(
            &self.state.envelope,
            &info.event.encrypted_callback_secret,
        )
        .await
        .unwrap()
    }

    /// Poll until the job leaves `scheduled`/`running` and its outcome is in.
    pub async fn wait_for_outcome(&self, job_id: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        loop {
            let (status, job) = self.get(&format!("/api/job/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK, "{job}");
            if job["callbacked"] == true {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} never reported: {job}"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
