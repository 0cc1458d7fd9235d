use anyhow::Context;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use yieldledger::datasource::{IndexerDataSource, RateFeedDataSource, Throttled};
use yieldledger::engine::Reconciler;
use yieldledger::orchestration::{load_tracked_positions, ReportService, Sweeper};
use yieldledger::{api, config::Config, db::init_db, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    // One throttle per upstream service
    let indexer = Arc::new(Throttled::new(
        Arc::new(IndexerDataSource::new(config.indexer_api_url.clone())),
        "indexer",
        config.upstream_max_in_flight,
        config.upstream_timeout(),
    ));
    let rates = Arc::new(Throttled::new(
        Arc::new(RateFeedDataSource::new(config.rates_api_url.clone())),
        "rates",
        config.upstream_max_in_flight,
        config.upstream_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_task = match (&config.tracked_positions_file, config.sweep_interval()) {
        (Some(path), Some(interval)) => {
            let targets = load_tracked_positions(Path::new(path))
                .with_context(|| format!("Failed to load tracked positions from {}", path))?;
            tracing::info!(
                targets = targets.len(),
                interval_secs = interval.as_secs(),
                "Scheduling periodic sweep"
            );
            let sweeper = Arc::new(Sweeper::new(
                Arc::new(Reconciler::new(repo.clone())),
                indexer.clone(),
                indexer.clone(),
                config.sweep_concurrency,
            ));
            Some(tokio::spawn(sweeper.run_periodic(
                Arc::new(targets),
                interval,
                shutdown_rx.clone(),
            )))
        }
        (None, Some(_)) => {
            tracing::info!("TRACKED_POSITIONS_FILE not set; periodic sweep disabled");
            None
        }
        (_, None) => {
            tracing::info!("SWEEP_INTERVAL_SECS is 0; periodic sweep disabled");
            None
        }
    };

    let reports = Arc::new(ReportService::new(repo.clone(), indexer, rates));
    let app = api::create_router(api::AppState::new(repo, reports));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Server error")?;

    if let Some(task) = sweep_task {
        // in-flight pairs finish; no new pair starts
        task.await.context("Sweep task panicked")?;
    }
    Ok(())
}
