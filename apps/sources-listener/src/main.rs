//! Koku sources listener.
//!
//! Consumes source registry events, keeps the `sources` table current and
//! drives provider create/update/destroy calls against cost management.

mod config;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use koku_sources_client::{ProviderClient, SourcesApi, SourcesClient};
use koku_sources_db::{run_migrations, DbPool, PgSourceStore};
use koku_sources_sync::SyncEngine;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sources_api = %config.sources_api.base_url,
        koku_api = %config.koku_api.base_url,
        max_in_flight = config.sync.max_in_flight,
        "Starting koku sources listener"
    );

    #[cfg(feature = "kafka")]
    let kafka_config = match koku_sources_events::KafkaConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid Kafka configuration");
            std::process::exit(1);
        }
    };

    let pool = match DbPool::connect(&config.database_url, config.database_max_connections).await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };
    if let Err(e) = run_migrations(&pool).await {
        error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }

    let sources = match SourcesClient::new(config.sources_api.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build source registry client");
            std::process::exit(1);
        }
    };
    let providers = match ProviderClient::new(config.koku_api.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build provider-management client");
            std::process::exit(1);
        }
    };

    // Cancelled by the signal handler; stops broker consumption.
    let shutdown = CancellationToken::new();
    // Cancelled once consumption has stopped; stops the engine.
    let engine_shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let Some(application_type_id) = fetch_application_type_id(
        sources.as_ref(),
        &config.sync.fake_auth_header,
        config.sync.retry_delay,
        &shutdown,
    )
    .await
    else {
        info!("Shutdown requested during startup");
        pool.close().await;
        return;
    };
    info!(application_type_id, "Resolved cost management application type");

    let store = Arc::new(PgSourceStore::new(pool.clone()));
    let (engine, workers) = SyncEngine::new(
        store,
        sources,
        providers,
        config.sync.clone(),
        engine_shutdown.clone(),
    );

    match engine.load_pending().await {
        Ok(count) => info!(count, "Queued pending source operations"),
        Err(e) => {
            error!(error = %e, "Failed to load pending source operations");
            std::process::exit(1);
        }
    }
    let workers = tokio::spawn(workers.run());

    #[cfg(feature = "kafka")]
    let exit_code = consume(
        engine,
        kafka_config,
        application_type_id,
        config.sync.retry_delay,
        &shutdown,
    )
    .await;
    #[cfg(not(feature = "kafka"))]
    let exit_code = idle(application_type_id, &shutdown).await;

    engine_shutdown.cancel();
    if let Err(e) = workers.await {
        error!(error = %e, "Synchronization engine task failed");
    }
    pool.close().await;
    info!("Listener shutdown complete");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Consume the sources topic until shutdown. Returns the process exit code.
#[cfg(feature = "kafka")]
async fn consume(
    engine: SyncEngine,
    kafka_config: koku_sources_events::KafkaConfig,
    application_type_id: i64,
    reconnect_delay: Duration,
    shutdown: &CancellationToken,
) -> i32 {
    use koku_sources_events::{EventClassifier, SourcesConsumer};

    let classifier = EventClassifier::new(kafka_config.topic.clone(), application_type_id);
    let consumer = SourcesConsumer::new(kafka_config, classifier, reconnect_delay);

    match consumer.run(Arc::new(engine), shutdown.clone()).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Event consumer failed");
            1
        }
    }
}

/// Without broker support only pending operations are processed.
#[cfg(not(feature = "kafka"))]
async fn idle(application_type_id: i64, shutdown: &CancellationToken) -> i32 {
    warn!(
        application_type_id,
        "Built without Kafka support; processing pending operations only"
    );
    shutdown.cancelled().await;
    0
}

/// Look up the cost management application type, retrying until the
/// registry answers. Returns `None` if shutdown is requested first.
async fn fetch_application_type_id(
    sources: &dyn SourcesApi,
    auth_header: &str,
    retry_delay: Duration,
    shutdown: &CancellationToken,
) -> Option<i64> {
    loop {
        match sources.application_type_id(auth_header).await {
            Ok(id) => return Some(id),
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = retry_delay.as_secs_f64(),
                    "Unable to look up application type"
                );
            }
        }
        tokio::select! {
            () = shutdown.cancelled() => return None,
            () = tokio::time::sleep(retry_delay) => {}
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    shutdown.cancel();
}
