use super::aggregator::RatingAggregator;
use super::store::RatingStore;
use super::{RatingInfo, RatingRecord, RatingRelatedType};
use crate::cache::CacheClient;
use crate::context::RequestContext;
use crate::database::DatabaseResult;
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on re-memoizing after a write, independent of the caller's context
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write-through facade over the store and the aggregator
///
/// Every successful write recomputes the memoized rating info of the entity
/// it touched. Once the store has committed, the write is reported as
/// successful whatever happens to the cache.
#[derive(Clone)]
pub struct RatingService {
    store: RatingStore,
    aggregator: RatingAggregator,
}

impl RatingService {
    pub fn new(store: impl Into<RatingStore>, cache: Option<&CacheClient>) -> Self {
        let store = store.into();
        let aggregator = match cache {
            Some(cache) => RatingAggregator::new(store.clone()).with_cache(cache),
            None => RatingAggregator::new(store.clone()),
        };
        Self { store, aggregator }
    }

    pub fn aggregator(&self) -> &RatingAggregator {
        &self.aggregator
    }

    pub async fn create_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<RatingRecord> {
        let created = self.store.create_rating(ctx, record).await?;
        self.settle(created.related_type, created.related_id).await;
        Ok(created)
    }

    /// Returns affected rows; `0` means no rating existed for the tuple
    pub async fn update_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<u64> {
        let affected = self.store.update_rating(ctx, record).await?;
        if affected > 0 {
            self.settle(record.related_type, record.related_id).await;
        }
        Ok(affected)
    }

    pub async fn delete_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<u64> {
        let affected = self.store.delete_rating(ctx, record).await?;
        if affected > 0 {
            self.settle(record.related_type, record.related_id).await;
        }
        Ok(affected)
    }

    /// Bring the memoized info in line with a committed write
    ///
    /// Runs on its own context so a caller that gives up after the commit
    /// does not leave a stale entry behind. Falls back to dropping the entry.
    async fn settle(&self, related_type: RatingRelatedType, related_id: i64) {
        if !self.aggregator.is_memoized() {
            return;
        }

        let ctx = RequestContext::background().with_timeout(SETTLE_TIMEOUT);
        let Err(e) = self
            .aggregator
            .refresh(&ctx, related_type, related_id)
            .await
        else {
            return;
        };

        tracing::warn!(
            "Failed to refresh rating info {}:{} after write: {}",
            related_type,
            related_id,
            e
        );
        if let Err(e) = self
            .aggregator
            .invalidate(&ctx, related_type, related_id)
            .await
        {
            tracing::warn!(
                "Rating info {}:{} may stay stale until it expires: {}",
                related_type,
                related_id,
                e
            );
        }
    }

    pub async fn find_rating(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Option<RatingRecord>> {
        self.store
            .find_rating(ctx, user_id, related_type, related_id)
            .await
    }

    pub async fn get_rating_info(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<RatingInfo> {
        self.aggregator
            .get_rating_info(ctx, related_type, related_id)
            .await
    }

    pub async fn get_rating_info_by_ids(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_ids: &[i64],
    ) -> DatabaseResult<HashMap<i64, RatingInfo>> {
        self.aggregator
            .get_rating_info_by_ids(ctx, related_type, related_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheResult, MemoryCache};
    use crate::database::DatabaseError;
    use crate::rating::store::MockRatingStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Memory cache whose writes take longer than a short request deadline
    struct SlowWriteCache {
        inner: MemoryCache,
        delay: Duration,
    }

    #[async_trait]
    impl CacheBackend for SlowWriteCache {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(key, value, ttl).await
        }

        async fn set_if_absent(
            &self,
            key: &str,
            value: String,
            ttl: Option<Duration>,
        ) -> CacheResult<bool> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> CacheResult<bool> {
            self.inner.exists(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
            self.inner.expire(key, ttl).await
        }

        async fn ping(&self) -> CacheResult<()> {
            Ok(())
        }
    }

    fn plan_rating(user_id: i64, related_id: i64, rating: i32) -> RatingRecord {
        RatingRecord::new(user_id, RatingRelatedType::TrainingPlan, related_id, rating)
    }

    fn cached_service() -> (RatingService, MockRatingStore) {
        let store = MockRatingStore::new();
        let cache = CacheClient::new_memory();
        (RatingService::new(store.clone(), Some(&cache)), store)
    }

    #[tokio::test]
    async fn test_writes_invalidate_memoized_info() {
        let (service, _) = cached_service();
        let ctx = RequestContext::background();

        let first = plan_rating(1, 10, 4);
        service.create_rating(&ctx, &first).await.unwrap();
        let info = service
            .get_rating_info(&ctx, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(info.count, 1);

        service
            .create_rating(&ctx, &plan_rating(2, 10, 2))
            .await
            .unwrap();
        let info = service
            .get_rating_info(&ctx, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(info.count, 2);
        assert_eq!(info.average, 3.0);

        let updated = plan_rating(1, 10, 2);
        assert_eq!(service.update_rating(&ctx, &updated).await.unwrap(), 1);
        let info = service
            .get_rating_info(&ctx, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(info.average, 2.0);

        assert_eq!(service.delete_rating(&ctx, &updated).await.unwrap(), 1);
        let info = service
            .get_rating_info(&ctx, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(info.count, 1);
    }

    #[tokio::test]
    async fn test_update_missing_tuple_reports_zero() {
        let (service, _) = cached_service();
        let ctx = RequestContext::background();

        let record = plan_rating(5, 77, 3);
        assert_eq!(service.update_rating(&ctx, &record).await.unwrap(), 0);
        assert_eq!(service.delete_rating(&ctx, &record).await.unwrap(), 0);
        assert!(
            service
                .find_rating(&ctx, 5, RatingRelatedType::TrainingPlan, 77)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_untouched() {
        let (service, store) = cached_service();
        let ctx = RequestContext::background();

        store.fail_next(DatabaseError::Database("disk full".to_string()));
        let err = service
            .create_rating(&ctx, &plan_rating(1, 10, 4))
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Database(_)));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_committed_write_survives_caller_deadline() {
        let store = MockRatingStore::new();
        let backend = SlowWriteCache {
            inner: MemoryCache::new(),
            delay: Duration::from_millis(200),
        };
        let cache = CacheClient::with_backend(Arc::new(backend), "");
        let service = RatingService::new(store.clone(), Some(&cache));
        let background = RequestContext::background();

        let before = service
            .get_rating_info(&background, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(before.count, 0);

        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));
        let created = service
            .create_rating(&ctx, &plan_rating(1, 10, 5))
            .await
            .unwrap();
        assert_eq!(created.rating, 5);
        assert_eq!(store.records().len(), 1);

        let after = service
            .get_rating_info(&background, RatingRelatedType::TrainingPlan, 10)
            .await
            .unwrap();
        assert_eq!(after.count, 1);
        assert_eq!(after.average, 5.0);
    }

    #[tokio::test]
    async fn test_cache_failure_after_write_is_not_an_error() {
        let mock = Arc::new(crate::cache::MockCache::new());
        mock.expect_set("rating_info:course:3")
            .returns_error(crate::cache::CacheError::Connection("refused".to_string()));

        let store = MockRatingStore::new();
        let cache = CacheClient::with_backend(mock.clone(), "");
        let service = RatingService::new(store.clone(), Some(&cache));
        let ctx = RequestContext::background();

        let record = RatingRecord::new(1, RatingRelatedType::Course, 3, 4);
        service.create_rating(&ctx, &record).await.unwrap();

        assert_eq!(store.records().len(), 1);
        mock.assert_expectations_met();
    }
}
