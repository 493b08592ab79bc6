use std::sync::Arc;

use dotenvy::dotenv;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod infrastructure;
mod modules;
mod state;
#[cfg(test)]
mod testing;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool::{connect_to_db, run_migrations};
use infrastructure::queue::rabbitmq::RabbitMqService;
use infrastructure::storage::s3::StorageService;
use state::AppState;
use workers::job_manager::JobManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::new()?;

    let default_filter = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting encoder service...");

    let db = connect_to_db(config.dsn(), config.debug).await?;
    if config.auto_migrate_db {
        run_migrations(&db).await?;
    }

    tokio::fs::create_dir_all(&config.local_storage_path).await?;

    let storage = Arc::new(StorageService::new(
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    ));
    for bucket in [&config.input_bucket, &config.output_bucket] {
        if let Err(e) = storage.ensure_bucket_exists(bucket).await {
            warn!("Failed to ensure bucket '{}' exists: {}", bucket, e);
        }
    }

    let queue = RabbitMqService::new(&config.rabbitmq_url).await?;

    let (message_tx, message_rx) = mpsc::channel(config.concurrency_workers.max(1));
    queue.start_consumer(
        config.consumer_queue.clone(),
        config.dead_letter_exchange.clone(),
        config.consumer_name.clone(),
        message_tx,
    );

    let state = AppState::new(config, db, storage, queue);

    JobManager::new(state, message_rx).start().await
}
