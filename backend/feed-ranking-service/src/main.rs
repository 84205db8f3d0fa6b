use anyhow::{Context, Result};
use feed_cache::{CacheMetrics, RedisCache};
use feed_ranking::{
    db::{PgContentStore, PgEventLog},
    jobs::ProfileRefreshJob,
    services::profile_builder::ProfileUpdaterConfig,
    Config, ProfileUpdater,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load config")?;

    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        warn!(error = %e, "Failed to register cache metrics");
    }

    info!(
        service = %config.service.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting feed ranking worker"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let cache = RedisCache::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    let events = Arc::new(PgEventLog::new(pool.clone()));
    let content = Arc::new(PgContentStore::new(pool));
    let updater = Arc::new(ProfileUpdater::new(
        events.clone(),
        content,
        Arc::new(cache),
        ProfileUpdaterConfig::from(&config.ranking),
    ));

    let job = ProfileRefreshJob::new(config.profile_job.clone(), events, updater);

    if config.profile_job.run_once {
        let stats = job.run().await.context("Profile refresh failed")?;
        info!(
            processed = stats.users_processed,
            succeeded = stats.users_succeeded,
            failed = stats.users_failed,
            "Profile refresh completed"
        );
        return Ok(());
    }

    tokio::select! {
        result = job.run() => {
            if let Err(e) = result {
                error!(error = %e, "Profile refresh worker stopped");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Plain logs by default, JSON lines with LOG_FORMAT=json
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
