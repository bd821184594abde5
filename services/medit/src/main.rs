use anyhow::{Context, Result};
use medit_service::api::start_api_server;
use medit_service::{
    AppState, BlobStore, Config, DynamoMetadataStore, InMemoryBlobStore, InMemoryMetadataStore,
    MeditService, MetadataStore, S3BlobStore, StorageBackend,
};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config).context("Failed to initialize logging")?;

    info!(
        service = %config.service.name,
        version = %config.service.version,
        ctxt = %config.medit.ctxt,
        "Starting Medit Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let (metadata_store, blob_store) = build_stores(&config).await?;

    let api_state = AppState {
        service: Arc::new(MeditService::new(&config, metadata_store, blob_store)),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Medit service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down medit service");

    api_handle.abort();

    info!("Medit service stopped");

    Ok(())
}

/// Build the metadata and blob stores for the configured backend
async fn build_stores(config: &Config) -> Result<(Arc<dyn MetadataStore>, Arc<dyn BlobStore>)> {
    match config.service.backend {
        StorageBackend::Aws => {
            let metadata_store: Arc<dyn MetadataStore> = Arc::new(
                DynamoMetadataStore::new(&config.dynamo)
                    .await
                    .context("Failed to initialize metadata store")?,
            );
            let blob_store: Arc<dyn BlobStore> = Arc::new(
                S3BlobStore::new(&config.s3)
                    .await
                    .context("Failed to initialize blob store")?,
            );
            Ok((metadata_store, blob_store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory stores; medits are lost on shutdown");
            let metadata_store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
            let blob_store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
            Ok((metadata_store, blob_store))
        }
    }
}

/// Initialize tracing/logging to stdout and, if configured, a log file
fn init_tracing(config: &Config) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));

    let file_layer = match config.service.log_filename.as_deref() {
        Some(path) => {
            let file = open_log_file(Path::new(path), config.service.create_log)?;
            Some(fmt::layer().json().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .with(file_layer)
        .init();

    Ok(())
}

/// Open a log file for appending, creating its directory when asked to
fn open_log_file(path: &Path, create_dir: bool) -> Result<File> {
    if create_dir {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
