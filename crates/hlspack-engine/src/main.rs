//! HLS packaging worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hlspack_datastore::{Datastore, FirestoreConfig, FirestoreDatastore};
use hlspack_engine::{EngineConfig, EngineContext, HttpPublisher, TaskRouter};
use hlspack_media::FfmpegTranscoder;
use hlspack_storage::{ObjectStore, R2Client, R2Config};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("hlspack=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting hlspack-worker");

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        error!("Failed to install Prometheus exporter: {e}");
    }

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let db: Arc<dyn Datastore> = match FirestoreConfig::from_env() {
        Ok(firestore_config) => match FirestoreDatastore::new(firestore_config).await {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!("Failed to connect to Firestore: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Invalid Firestore configuration: {e}");
            std::process::exit(1);
        }
    };

    let staging: Arc<dyn ObjectStore> = match build_store("STAGING").await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create staging store client: {e}");
            std::process::exit(1);
        }
    };
    let serving: Arc<dyn ObjectStore> = match build_store("R2").await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create serving store client: {e}");
            std::process::exit(1);
        }
    };

    let publisher = match HttpPublisher::from_env() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to create publisher: {e}");
            std::process::exit(1);
        }
    };

    let transcoder = Arc::new(FfmpegTranscoder::new(6, config.transcode_timeout_secs));

    let ctx = Arc::new(EngineContext::new(
        config, db, staging, serving, transcoder, publisher,
    ));
    let router = TaskRouter::with_default_handlers(&ctx);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    router.run(shutdown_rx).await;

    info!("Worker shutdown complete");
}

async fn build_store(prefix: &str) -> hlspack_storage::StorageResult<Arc<dyn ObjectStore>> {
    let config = R2Config::from_env_with_prefix(prefix)?;
    let client = R2Client::new(config).await?;
    Ok(Arc::new(client))
}
