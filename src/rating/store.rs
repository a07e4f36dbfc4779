//! Rating store: the persistence boundary for rating records
//!
//! [`RatingStore`] is a closed set of implementations: the sea-orm DAO used in
//! production and [`MockRatingStore`], an in-memory double whose latency and
//! failures can be scripted by tests.

use crate::context::RequestContext;
use crate::database::{
    DatabaseError, DatabaseResult, RatingDistRow, RatingDistRowById, RatingsDao,
};
use crate::database::entities::{MAX_RATING, MIN_RATING, RatingRecord, RatingRelatedType};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rating store backend
#[derive(Clone)]
pub enum RatingStore {
    Database(RatingsDao),
    Mock(MockRatingStore),
}

impl RatingStore {
    /// Insert one rating record
    pub async fn create_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<RatingRecord> {
        match self {
            RatingStore::Database(dao) => dao.create(ctx, record).await,
            RatingStore::Mock(mock) => mock.create(ctx, record).await,
        }
    }

    /// Update the record matching (user, related type, related id)
    ///
    /// Zero affected rows is reported as `Ok(0)`, not as an error.
    pub async fn update_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<u64> {
        match self {
            RatingStore::Database(dao) => dao.update(ctx, record).await,
            RatingStore::Mock(mock) => mock.update(ctx, record).await,
        }
    }

    /// Delete the record matching (user, related type, related id)
    pub async fn delete_rating(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<u64> {
        match self {
            RatingStore::Database(dao) => dao.delete(ctx, record).await,
            RatingStore::Mock(mock) => mock.delete(ctx, record).await,
        }
    }

    pub async fn find_rating(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Option<RatingRecord>> {
        match self {
            RatingStore::Database(dao) => dao.find(ctx, user_id, related_type, related_id).await,
            RatingStore::Mock(mock) => mock.find(ctx, user_id, related_type, related_id).await,
        }
    }

    pub async fn rating_distribution(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Vec<RatingDistRow>> {
        match self {
            RatingStore::Database(dao) => {
                dao.rating_distribution(ctx, related_type, related_id)
                    .await
            }
            RatingStore::Mock(mock) => {
                mock.rating_distribution(ctx, related_type, related_id)
                    .await
            }
        }
    }

    pub async fn rating_distribution_by_ids(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_ids: &[i64],
    ) -> DatabaseResult<Vec<RatingDistRowById>> {
        match self {
            RatingStore::Database(dao) => {
                dao.rating_distribution_by_ids(ctx, related_type, related_ids)
                    .await
            }
            RatingStore::Mock(mock) => {
                mock.rating_distribution_by_ids(ctx, related_type, related_ids)
                    .await
            }
        }
    }
}

impl From<RatingsDao> for RatingStore {
    fn from(dao: RatingsDao) -> Self {
        RatingStore::Database(dao)
    }
}

impl From<MockRatingStore> for RatingStore {
    fn from(mock: MockRatingStore) -> Self {
        RatingStore::Mock(mock)
    }
}

#[derive(Default)]
struct MockState {
    records: Vec<RatingRecord>,
    next_id: i32,
    latency: Option<Duration>,
    scripted_errors: VecDeque<DatabaseError>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory rating store with scriptable latency and failures
#[derive(Clone, Default)]
pub struct MockRatingStore {
    state: Arc<Mutex<MockState>>,
}

impl MockRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records, assigning ids where missing
    pub fn with_records(records: impl IntoIterator<Item = RatingRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for mut record in records {
                state.next_id += 1;
                if record.id == 0 {
                    record.id = state.next_id;
                }
                state.records.push(record);
            }
        }
        store
    }

    /// Delay every subsequent call by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Make the next call fail with `error`
    ///
    /// Errors queue up; each call consumes at most one.
    pub fn fail_next(&self, error: DatabaseError) {
        self.lock().scripted_errors.push_back(error);
    }

    /// Number of calls made to an operation, e.g. `"rating_distribution"`
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Snapshot of stored records
    pub fn records(&self) -> Vec<RatingRecord> {
        self.lock().records.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate(&self, operation: &'static str) -> DatabaseResult<()> {
        let (latency, scripted) = {
            let mut state = self.lock();
            *state.calls.entry(operation).or_insert(0) += 1;
            (state.latency, state.scripted_errors.pop_front())
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<RatingRecord> {
        ctx.run(async {
            self.simulate("create").await?;
            check_range(record)?;

            let mut state = self.lock();
            let duplicate = state.records.iter().any(|r| same_tuple(r, record));
            if duplicate {
                return Err(DatabaseError::Constraint(format!(
                    "rating already exists for user {} on {}:{}",
                    record.user_id, record.related_type, record.related_id
                )));
            }

            state.next_id += 1;
            let now = Utc::now();
            let stored = RatingRecord {
                id: state.next_id,
                created_at: now,
                updated_at: now,
                ..record.clone()
            };
            state.records.push(stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, record: &RatingRecord) -> DatabaseResult<u64> {
        ctx.run(async {
            self.simulate("update").await?;
            check_range(record)?;

            let mut state = self.lock();
            let mut affected = 0;
            for stored in state.records.iter_mut().filter(|r| same_tuple(r, record)) {
                stored.rating = record.rating;
                stored.metadata = record.metadata.clone();
                stored.updated_at = Utc::now();
                affected += 1;
            }
            Ok(affected)
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, record: &RatingRecord) -> DatabaseResult<u64> {
        ctx.run(async {
            self.simulate("delete").await?;

            let mut state = self.lock();
            let before = state.records.len();
            state.records.retain(|r| !same_tuple(r, record));
            Ok((before - state.records.len()) as u64)
        })
        .await
    }

    async fn find(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Option<RatingRecord>> {
        ctx.run(async {
            self.simulate("find").await?;

            let state = self.lock();
            Ok(state
                .records
                .iter()
                .find(|r| {
                    r.user_id == user_id
                        && r.related_type == related_type
                        && r.related_id == related_id
                })
                .cloned())
        })
        .await
    }

    async fn rating_distribution(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Vec<RatingDistRow>> {
        ctx.run(async {
            self.simulate("rating_distribution").await?;

            let state = self.lock();
            let mut counts: HashMap<i32, i64> = HashMap::new();
            for record in state
                .records
                .iter()
                .filter(|r| r.related_type == related_type && r.related_id == related_id)
            {
                *counts.entry(record.rating).or_insert(0) += 1;
            }

            Ok(counts
                .into_iter()
                .map(|(rating, count)| RatingDistRow { rating, count })
                .collect())
        })
        .await
    }

    async fn rating_distribution_by_ids(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_ids: &[i64],
    ) -> DatabaseResult<Vec<RatingDistRowById>> {
        ctx.run(async {
            self.simulate("rating_distribution_by_ids").await?;

            let state = self.lock();
            let mut counts: HashMap<(i64, i32), i64> = HashMap::new();
            for record in state.records.iter().filter(|r| {
                r.related_type == related_type && related_ids.contains(&r.related_id)
            }) {
                *counts
                    .entry((record.related_id, record.rating))
                    .or_insert(0) += 1;
            }

            Ok(counts
                .into_iter()
                .map(|((related_id, rating), count)| RatingDistRowById {
                    related_id,
                    rating,
                    count,
                })
                .collect())
        })
        .await
    }
}

fn same_tuple(a: &RatingRecord, b: &RatingRecord) -> bool {
    a.user_id == b.user_id && a.related_type == b.related_type && a.related_id == b.related_id
}

fn check_range(record: &RatingRecord) -> DatabaseResult<()> {
    if record.has_valid_rating() {
        Ok(())
    } else {
        Err(DatabaseError::Constraint(format!(
            "rating {} outside {MIN_RATING}..={MAX_RATING}",
            record.rating
        )))
    }
}
