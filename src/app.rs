use crate::{
    cache::CacheClient,
    config::Config,
    database::{DatabaseManager, DatabaseManagerImpl},
    error::AppError,
    queue::{
        Broker, QueueClient, RefreshRatingInfoHandler, ServeMux, WorkerServer,
        handlers::TASK_RATING_REFRESH,
    },
    rating::RatingService,
    shutdown::ShutdownCoordinator,
};
use std::sync::Arc;
use tracing::info;

/// Process-wide components, constructed once and passed to whoever needs them
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub database: Arc<dyn DatabaseManager>,
    pub cache: CacheClient,
    pub broker: Broker,
    pub queue: QueueClient,
    pub ratings: RatingService,
}

impl App {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let cache = CacheClient::new_from_config(&config.cache).await?;

        let database = Arc::new(DatabaseManagerImpl::new_from_config(&config.database).await?);
        database.health_check().await?;
        if config.database.migration_on_startup {
            database.migrate().await?;
        }
        let database: Arc<dyn DatabaseManager> = database;

        let broker = Broker::new_from_config(&config.cache, &config.queue).await?;
        let queue = QueueClient::new(broker.clone(), config.queue.clone());
        let ratings = RatingService::new(database.ratings(), Some(&cache));

        info!(
            "Components ready (cache: {}, broker endpoint: {})",
            cache.backend_name(),
            config.cache.dsn()
        );

        Ok(Self {
            config: Arc::new(config),
            database,
            cache,
            broker,
            queue,
            ratings,
        })
    }

    /// Handler table for the worker server
    pub fn serve_mux(&self) -> ServeMux {
        let mut mux = ServeMux::new();
        mux.handle(
            TASK_RATING_REFRESH,
            Arc::new(RefreshRatingInfoHandler::new(
                self.ratings.aggregator().clone(),
            )),
        );
        mux
    }

    /// Run the worker server until `shutdown` fires
    pub async fn run_worker(&self, shutdown: &ShutdownCoordinator) -> Result<(), AppError> {
        let server = WorkerServer::new(self.broker.clone(), self.config.queue.clone())
            .with_shutdown(shutdown.subscribe());
        server.run(self.serve_mux()).await?;
        Ok(())
    }
}
