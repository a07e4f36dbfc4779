use super::{QueueResult, Task, TaskHandler};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::rating::{RatingAggregator, RatingRelatedType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Task type that recomputes one entity's memoized rating info
pub const TASK_RATING_REFRESH: &str = "rating:refresh";

const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRatingPayload {
    pub related_type: RatingRelatedType,
    pub related_id: i64,
}

/// Build a `rating:refresh` task
pub fn refresh_rating_task(related_type: RatingRelatedType, related_id: i64) -> QueueResult<Task> {
    Task::with_payload(
        TASK_RATING_REFRESH,
        &RefreshRatingPayload {
            related_type,
            related_id,
        },
    )
}

pub struct RefreshRatingInfoHandler {
    aggregator: RatingAggregator,
}

impl RefreshRatingInfoHandler {
    pub fn new(aggregator: RatingAggregator) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl TaskHandler for RefreshRatingInfoHandler {
    fn name(&self) -> &str {
        "refresh_rating_info"
    }

    async fn process(&self, task: &Task) -> Result<(), AppError> {
        let payload: RefreshRatingPayload = task.payload_as()?;
        let ctx = RequestContext::background().with_timeout(REFRESH_TIMEOUT);

        let info = self
            .aggregator
            .refresh(&ctx, payload.related_type, payload.related_id)
            .await?;

        tracing::info!(
            "Refreshed rating info for {}:{} ({} ratings, average {:.2})",
            payload.related_type,
            payload.related_id,
            info.count,
            info.average
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheClient;
    use crate::queue::QueueError;
    use crate::rating::{MockRatingStore, RatingInfo, RatingRecord};

    #[tokio::test]
    async fn test_refresh_warms_cache() {
        let store = MockRatingStore::with_records(vec![
            RatingRecord::new(1, RatingRelatedType::Course, 5, 4),
            RatingRecord::new(2, RatingRelatedType::Course, 5, 2),
        ]);
        let cache = CacheClient::new_memory();
        let aggregator = RatingAggregator::new(store.clone()).with_cache(&cache);
        let handler = RefreshRatingInfoHandler::new(aggregator.clone());

        let task = refresh_rating_task(RatingRelatedType::Course, 5).unwrap();
        assert_eq!(task.task_type, TASK_RATING_REFRESH);
        handler.process(&task).await.unwrap();

        let ctx = RequestContext::background();
        let cached = cache
            .typed::<RatingInfo>()
            .get(&ctx, "course:5")
            .await
            .unwrap();
        assert_eq!(cached.map(|info| info.count), Some(2));

        // Served from cache, so the store sees no second query
        aggregator
            .get_rating_info(&ctx, RatingRelatedType::Course, 5)
            .await
            .unwrap();
        assert_eq!(store.call_count("rating_distribution"), 1);
    }

    #[tokio::test]
    async fn test_bad_payload_is_rejected() {
        let handler = RefreshRatingInfoHandler::new(RatingAggregator::new(MockRatingStore::new()));
        let task = Task::new(TASK_RATING_REFRESH, serde_json::json!({"related_id": "x"}));

        let err = handler.process(&task).await.unwrap_err();
        assert!(matches!(err, AppError::Queue(QueueError::Serialization(_))));
    }
}
