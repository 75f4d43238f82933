//! Drop worker entry point
//!
//! Under Lambda (`AWS_LAMBDA_RUNTIME_API` set) every invocation payload is a
//! [`DropEvent`]. Otherwise the event is read from the path given as the
//! first argument, or from stdin when the argument is `-` or missing.
//!
//! The outcome goes to stdout and, when the event asks for it, to the
//! server callback. The process exits 0 whether or not a table was booked.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use cierge_types::{DropEvent, Outcome};
use cierge_worker::{Worker, WorkerConfig};
use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, prelude::*};

fn init_tracing() -> Option<sentry::ClientInitGuard> {
    let sentry_endpoint = std::env::var("SENTRY_ENDPOINT").unwrap_or_default();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,hyper=warn,hyper_util=warn,h2=warn,rustls=warn,tower=warn")
    });

    // stdout carries the outcome line; logs go to stderr.
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    if sentry_endpoint.is_empty() {
        tracing_subscriber::registry().with(fmt).init();
        None
    } else {
        let guard = sentry::init((
            sentry_endpoint,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 0.3,
                ..Default::default()
            },
        ));
        tracing_subscriber::registry()
            .with(fmt)
            .with(sentry_tracing::layer())
            .init();
        Some(guard)
    }
}

async fn read_event(source: Option<String>) -> Result<DropEvent, Error> {
    let raw = match source.as_deref() {
        Some(path) if path != "-" => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::from(format!("could not read event file {}: {}", path, e)))?,
        _ => tokio::task::spawn_blocking(|| {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw).map(|_| raw)
        })
        .await??,
    };
    Ok(serde_json::from_str(&raw)?)
}

async fn handle(worker: Worker, event: LambdaEvent<DropEvent>) -> Result<Outcome, Error> {
    let cancel = CancellationToken::new();
    let drop_event = event.payload;
    tracing::info!(job_id = %drop_event.job_id, platform = %drop_event.platform, "Drop event received");
    Ok(worker.run(drop_event, &cancel).await)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    let _sentry_guard = init_tracing();

    let config = WorkerConfig::from_env();
    tracing::debug!(?config, "Worker configuration");
    let envelope = config.envelope().await?;
    let worker = Worker::new(envelope, config.registry(), config);

    if std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_some() {
        tracing::info!("Starting Cierge worker Lambda");
        return run(service_fn(move |event: LambdaEvent<DropEvent>| {
            handle(worker.clone(), event)
        }))
        .await;
    }

    let event = read_event(std::env::args().nth(1)).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning drop");
            on_signal.cancel();
        }
    });

    worker.run(event, &cancel).await;
    Ok(())
}
