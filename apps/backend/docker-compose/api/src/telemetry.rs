use tracing_subscriber::{EnvFilter, prelude::*};

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,hyper=warn,hyper_util=warn,h2=warn,rustls=warn,sqlx=warn,tower=warn")
    })
}

/// Install the fmt subscriber, plus Sentry when `SENTRY_ENDPOINT` is set.
/// The returned guard flushes Sentry on drop.
pub fn init() -> Option<sentry::ClientInitGuard> {
    let sentry_endpoint = std::env::var("SENTRY_ENDPOINT").unwrap_or_default();

    if sentry_endpoint.is_empty() {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(default_filter()))
            .init();
        return None;
    }

    let guard = sentry::init((
        sentry_endpoint,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate: 0.3,
            ..Default::default()
        },
    ));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(default_filter()))
        .with(sentry_tracing::layer())
        .init();
    Some(guard)
}
