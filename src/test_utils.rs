use crate::{
    App,
    config::Config,
    context::RequestContext,
    database::entities::{RatingRecord, RatingRelatedType},
};

/// Test app builder over an in-memory database and cache
pub struct TestAppBuilder {
    config: Config,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub async fn build(self) -> App {
        let mut config = self.config;

        // Every pooled connection to sqlite::memory: is a separate database
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        config.database.migration_on_startup = true;
        config.cache.backend = "memory".to_string();
        config.queue.poll_interval_ms = 10;

        App::new(config).await.expect("failed to build test app")
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert one rating per value for `related_id`, using user ids starting at `first_user_id`
pub async fn seed_ratings(
    app: &App,
    related_type: RatingRelatedType,
    related_id: i64,
    first_user_id: i64,
    values: &[i32],
) -> Vec<RatingRecord> {
    let ctx = RequestContext::background();
    let mut created = Vec::with_capacity(values.len());

    for (offset, value) in values.iter().enumerate() {
        let record = RatingRecord::new(
            first_user_id + offset as i64,
            related_type,
            related_id,
            *value,
        );
        created.push(
            app.ratings
                .create_rating(&ctx, &record)
                .await
                .expect("failed to seed rating"),
        );
    }

    created
}
