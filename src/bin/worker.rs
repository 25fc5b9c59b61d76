use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use territory_scan::{
    config::AppConfig,
    db::{self, cache_queries::PgCacheStore, queries::PgJobStore},
    services::{
        cache::{ScanCaches, SystemClock},
        diagnostic::SignalDiagnosticBuilder,
        fetcher::RateLimitedFetcher,
        handlers::HandlerRegistry,
        pipeline::{Pipeline, PipelineConfig},
        places::GooglePlacesClient,
        website::HttpWebsiteProbe,
        worker::Worker,
    },
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting territory-scan worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid WORKER_METRICS_ADDR");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    metrics::describe_counter!("scan_jobs_claimed_total", "Jobs claimed by the worker");
    metrics::describe_counter!("scan_jobs_completed_total", "Jobs completed");
    metrics::describe_counter!("scan_jobs_failed_total", "Jobs that failed");
    metrics::describe_histogram!("scan_job_processing_seconds", "Time to process one job");
    metrics::describe_counter!("provider_requests_total", "Search provider request attempts");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let provider = GooglePlacesClient::new(
        &config.google_places_api_key,
        &config.places_base_url,
        config.http_timeout(),
    )
    .expect("Failed to initialize Places client");
    let probe = Arc::new(HttpWebsiteProbe::new(config.http_timeout()).expect("Failed to initialize website probe"));

    let cancel = CancellationToken::new();
    let fetcher = Arc::new(RateLimitedFetcher::new(
        Arc::new(provider),
        config.fetcher_config(),
        cancel.clone(),
    ));
    let caches = ScanCaches::new(Arc::new(PgCacheStore::new(db_pool.clone())), Arc::new(SystemClock));
    let diagnostics = Arc::new(SignalDiagnosticBuilder::new(fetcher.clone(), probe.clone()));

    let pipeline = Pipeline {
        fetcher,
        caches,
        probe,
        diagnostics,
        config: PipelineConfig::default(),
    };
    let worker = Worker::new(
        Arc::new(PgJobStore::new(db_pool)),
        HandlerRegistry::standard(),
        pipeline,
        config.worker_config(),
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping worker");
            cancel.cancel();
        }
    });

    tracing::info!("Worker ready, starting job processing loop");
    worker.run().await;
}
