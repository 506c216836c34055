use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kafka_resume::{
    config::Config,
    kafka::{PositionRecorder, ResumeConsumer},
    rebalance_handler::ResumeHandler,
    server::{router, serve, setup_metrics_recorder},
    store::FilePositionStore,
    waiter::LookupWaiter,
};

fn start_server(config: &Config) -> Result<JoinHandle<()>> {
    let router = router(setup_metrics_recorder()?);
    let bind = config.bind_address();

    Ok(tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!(error = ?e, "Metrics server stopped");
        }
    }))
}

fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received ctrl-c"),
            Err(e) => error!("Failed to listen for ctrl-c: {e}"),
        }
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Kafka resume consumer");

    let config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;

    info!("Configuration loaded: {:?}", config);

    let server_handle = start_server(&config)?;
    info!("Started metrics server on {}", config.bind_address());

    let shutdown = CancellationToken::new();
    shutdown_on_ctrl_c(shutdown.clone());

    let store = Arc::new(
        FilePositionStore::open(&config.position_store_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open position store at {}",
                    config.position_store_path
                )
            })?,
    );

    let waiter = LookupWaiter::current(config.position_lookup_timeout(), shutdown);
    let handler = Arc::new(ResumeHandler::new(store.clone(), waiter));

    let recorder = PositionRecorder::new(store, config.position_write_max_failures);
    let consumer = ResumeConsumer::new(
        &config.to_client_config(),
        handler,
        recorder,
        &config.topics(),
    )?;

    // Blocks until shutdown, a failed assignment or a position store outage
    let result = consumer.run().await;

    server_handle.abort();

    result
}
