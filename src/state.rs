use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::StorageService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub storage: Arc<StorageService>,
    pub queue: RabbitMqService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        storage: Arc<StorageService>,
        queue: RabbitMqService,
    ) -> Self {
        Self {
            config,
            db,
            storage,
            queue,
        }
    }
}
