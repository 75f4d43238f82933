#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use cierge_api::{
    config::ServerConfig, construct_router, db, dispatch::LocalWorkerHandler, state::State,
    token_store::TokenStore,
};
use cierge_envelope::{Envelope, KeyService, KmsConfig, KmsKeyService, LocalKeyService};
use cierge_scheduler::{
    AwsEventBridgeConfig, AwsEventBridgeScheduler, LocalScheduler, SchedulerBackend,
    SchedulerProvider,
};
use cierge_worker::{Worker, WorkerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod telemetry;

async fn key_service(config: &ServerConfig) -> Result<Arc<dyn KeyService>, Box<dyn std::error::Error>> {
    let service: Arc<dyn KeyService> = match config.kms.provider.to_ascii_lowercase().as_str() {
        "aws" => Arc::new(KmsKeyService::new(KmsConfig::new(&config.kms.key_id)).await),
        _ => Arc::new(LocalKeyService::from_spec(
            &config.kms.key_id,
            &config.kms.local_keys,
        )?),
    };
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let _sentry_guard = telemetry::init();

    tracing::info!("Starting Cierge API server");

    let config = ServerConfig::load()?;
    tracing::info!(
        kms = %config.kms.provider,
        scheduler = %config.scheduler.provider,
        environment = ?config.environment,
        "Loaded configuration"
    );

    let shutdown = CancellationToken::new();

    let db = db::connect(&config.database.url, config.database.timeout).await?;
    let tokens = TokenStore::open(&config.token_store.path).await?;
    tokens.spawn_gc(config.token_store.gc_interval, shutdown.clone());

    let envelope = Envelope::new(key_service(&config).await?);

    let provider = SchedulerProvider::from_str(&config.scheduler.provider);
    let local = Arc::new(LocalScheduler::new());
    let scheduler: Arc<dyn SchedulerBackend> = match provider {
        SchedulerProvider::Aws => Arc::new(
            AwsEventBridgeScheduler::new(AwsEventBridgeConfig {
                target_arn: config.scheduler.worker_target.clone(),
                role_arn: config.scheduler.role.clone(),
                group_name: config.scheduler.group.clone(),
            })
            .await,
        ),
        SchedulerProvider::Local => local.clone(),
    };

    let port = config.server.port;
    let rotation = config.credentials.clone();
    let state = Arc::new(State::new(
        config,
        db,
        tokens,
        envelope.clone(),
        scheduler,
    )?);

    state.credentials.spawn_expiry_sweep(
        rotation.rotation_interval,
        rotation.rotation_horizon,
        shutdown.clone(),
    );

    if provider == SchedulerProvider::Local {
        let worker_config = WorkerConfig::from_env();
        let registry = worker_config.registry();
        let worker = Worker::new(envelope, registry, worker_config);
        let handler = LocalWorkerHandler::new(worker, state.jobs.clone(), shutdown.clone());
        local.spawn(Arc::new(handler), shutdown.clone());
        tracing::info!("Drop events fire in-process");
    }

    let app = construct_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            stop.cancel();
        })
        .await?;

    Ok(())
}
