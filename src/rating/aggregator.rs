//! Read path: rating distributions reduced into [`RatingInfo`]
//!
//! The aggregator only reads from the store. When a typed cache is attached,
//! single-entity and batched lookups are memoized per (type, id); cache
//! failures are logged and the store is queried as if the entry were missing.
//!
//! Reads only fill an empty slot, while [`RatingAggregator::refresh`]
//! overwrites. A reader that computed its info before a write therefore
//! cannot replace the writer's refreshed entry.

use super::store::RatingStore;
use super::{RatingDistItem, RatingInfo, RatingRelatedType, group_by_related_id};
use crate::cache::{CacheClient, CacheError, TypedCache};
use crate::context::RequestContext;
use crate::database::{DatabaseError, DatabaseResult};
use std::collections::HashMap;

#[derive(Clone)]
pub struct RatingAggregator {
    store: RatingStore,
    cache: Option<TypedCache<RatingInfo>>,
}

/// Cache key for one entity's rating info
pub fn rating_info_key(related_type: RatingRelatedType, related_id: i64) -> String {
    format!("{}:{}", related_type, related_id)
}

impl RatingAggregator {
    pub fn new(store: impl Into<RatingStore>) -> Self {
        Self {
            store: store.into(),
            cache: None,
        }
    }

    /// Memoize results in `cache`
    pub fn with_cache(mut self, cache: &CacheClient) -> Self {
        self.cache = Some(cache.typed());
        self
    }

    pub fn store(&self) -> &RatingStore {
        &self.store
    }

    pub fn is_memoized(&self) -> bool {
        self.cache.is_some()
    }

    /// Rating distribution and summary for one entity
    ///
    /// An entity without ratings yields an empty distribution, count 0 and
    /// mean 0.
    pub async fn get_rating_info(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<RatingInfo> {
        let key = rating_info_key(related_type, related_id);

        if let Some(cached) = self.cached(ctx, &key).await? {
            return Ok(cached);
        }

        let info = self.compute(ctx, related_type, related_id).await?;
        self.remember(ctx, &key, &info).await;
        Ok(info)
    }

    /// Rating infos for many entities of one type, using a single grouped query
    ///
    /// Entities without ratings are absent from the returned map.
    pub async fn get_rating_info_by_ids(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_ids: &[i64],
    ) -> DatabaseResult<HashMap<i64, RatingInfo>> {
        let mut result = HashMap::new();
        if related_ids.is_empty() {
            return Ok(result);
        }

        let mut misses: Vec<i64> = Vec::with_capacity(related_ids.len());
        for &related_id in related_ids {
            if result.contains_key(&related_id) || misses.contains(&related_id) {
                continue;
            }
            let key = rating_info_key(related_type, related_id);
            match self.cached(ctx, &key).await? {
                // Empty entries stay out of the map so absence keeps meaning "no ratings"
                Some(info) if !info.is_empty() => {
                    result.insert(related_id, info);
                }
                Some(_) => {}
                None => misses.push(related_id),
            }
        }

        if misses.is_empty() {
            return Ok(result);
        }

        let rows = self
            .store
            .rating_distribution_by_ids(ctx, related_type, &misses)
            .await?;
        let mut computed = group_by_related_id(rows);

        for related_id in misses {
            let key = rating_info_key(related_type, related_id);
            match computed.remove(&related_id) {
                Some(info) => {
                    self.remember(ctx, &key, &info).await;
                    result.insert(related_id, info);
                }
                None => self.remember(ctx, &key, &RatingInfo::default()).await,
            }
        }

        Ok(result)
    }

    /// Drop the memoized entry for one entity
    pub async fn invalidate(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let key = rating_info_key(related_type, related_id);
        match cache.delete(ctx, &key).await {
            Ok(()) => {
                tracing::debug!("Invalidated rating info {}", key);
                Ok(())
            }
            Err(CacheError::Cancelled) => Err(DatabaseError::Cancelled),
            Err(e) => {
                tracing::warn!("Failed to invalidate rating info {}: {}", key, e);
                Ok(())
            }
        }
    }

    /// Recompute from the store and overwrite any memoized entry
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<RatingInfo> {
        let info = self.compute(ctx, related_type, related_id).await?;
        let key = rating_info_key(related_type, related_id);

        if let Some(cache) = &self.cache {
            match cache.set(ctx, &key, &info).await {
                Ok(()) => tracing::debug!("Refreshed rating info {}", key),
                Err(CacheError::Cancelled) => return Err(DatabaseError::Cancelled),
                Err(e) => tracing::warn!("Failed to refresh rating info {}: {}", key, e),
            }
        }
        Ok(info)
    }

    async fn compute(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<RatingInfo> {
        let rows = self
            .store
            .rating_distribution(ctx, related_type, related_id)
            .await?;
        Ok(RatingInfo::from_dist(rows.into_iter().map(RatingDistItem::from)))
    }

    async fn cached(&self, ctx: &RequestContext, key: &str) -> DatabaseResult<Option<RatingInfo>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };

        match cache.get(ctx, key).await {
            Ok(Some(info)) => {
                tracing::debug!("Cache hit for rating info {}", key);
                Ok(Some(info))
            }
            Ok(None) => {
                tracing::debug!("Cache miss for rating info {}", key);
                Ok(None)
            }
            Err(CacheError::Cancelled) => Err(DatabaseError::Cancelled),
            Err(e) => {
                tracing::warn!("Cache error for rating info {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn remember(&self, ctx: &RequestContext, key: &str, info: &RatingInfo) {
        let Some(cache) = &self.cache else {
            return;
        };

        match cache.set_if_absent(ctx, key, info).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Kept newer rating info {}", key),
            Err(e) => tracing::warn!("Failed to cache rating info {}: {}", key, e),
        }
    }
}
