use crate::context::RequestContext;
use crate::database::entities::{MAX_RATING, MIN_RATING, RatingRecord, RatingRelatedType, ratings};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    QueryFilter, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

/// Count of ratings sharing one value for a single entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromQueryResult, Serialize, Deserialize)]
pub struct RatingDistRow {
    pub rating: i32,
    pub count: i64,
}

/// Count of ratings sharing one value, tagged with the entity it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromQueryResult, Serialize, Deserialize)]
pub struct RatingDistRowById {
    pub related_id: i64,
    pub rating: i32,
    pub count: i64,
}

/// Ratings DAO for database operations
#[derive(Clone)]
pub struct RatingsDao {
    db: DatabaseConnection,
}

impl RatingsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a rating record
    ///
    /// Duplicate (user, related type, related id) tuples are rejected by the
    /// unique index and surface as [`DatabaseError::Constraint`].
    pub async fn create(
        &self,
        ctx: &RequestContext,
        record: &RatingRecord,
    ) -> DatabaseResult<RatingRecord> {
        check_rating_range(record.rating)?;

        let now = Utc::now();
        let active_model = ratings::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: Set(record.user_id),
            related_type: Set(record.related_type),
            related_id: Set(record.related_id),
            rating: Set(record.rating),
            metadata: Set(record.metadata.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = ctx
            .run(async { active_model.insert(&self.db).await.map_err(DatabaseError::from) })
            .await?;

        tracing::debug!(
            "Created rating {} for {}:{} by user {}",
            inserted.id,
            inserted.related_type,
            inserted.related_id,
            inserted.user_id
        );

        Ok(inserted)
    }

    /// Update rating value and metadata of the record owned by `record.user_id`
    ///
    /// Returns the number of affected rows. A tuple with no stored rating is
    /// not an error; the caller sees `0`.
    pub async fn update(&self, ctx: &RequestContext, record: &RatingRecord) -> DatabaseResult<u64> {
        check_rating_range(record.rating)?;

        let changes = ratings::ActiveModel {
            rating: Set(record.rating),
            metadata: Set(record.metadata.clone()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        let result = ctx
            .run(async {
                ratings::Entity::update_many()
                    .set(changes)
                    .filter(ratings::Column::UserId.eq(record.user_id))
                    .filter(ratings::Column::RelatedType.eq(record.related_type))
                    .filter(ratings::Column::RelatedId.eq(record.related_id))
                    .exec(&self.db)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete the record matching the tuple, returns affected rows
    pub async fn delete(&self, ctx: &RequestContext, record: &RatingRecord) -> DatabaseResult<u64> {
        let result = ctx
            .run(async {
                ratings::Entity::delete_many()
                    .filter(ratings::Column::UserId.eq(record.user_id))
                    .filter(ratings::Column::RelatedType.eq(record.related_type))
                    .filter(ratings::Column::RelatedId.eq(record.related_id))
                    .exec(&self.db)
                    .await
                    .map_err(DatabaseError::from)
            })
            .await?;

        Ok(result.rows_affected)
    }

    /// Find a user's rating for one entity
    pub async fn find(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Option<RatingRecord>> {
        ctx.run(async {
            ratings::Entity::find()
                .filter(ratings::Column::UserId.eq(user_id))
                .filter(ratings::Column::RelatedType.eq(related_type))
                .filter(ratings::Column::RelatedId.eq(related_id))
                .one(&self.db)
                .await
                .map_err(DatabaseError::from)
        })
        .await
    }

    /// Count ratings per value for one entity
    pub async fn rating_distribution(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_id: i64,
    ) -> DatabaseResult<Vec<RatingDistRow>> {
        ctx.run(async {
            ratings::Entity::find()
                .select_only()
                .column(ratings::Column::Rating)
                .column_as(Expr::col(ratings::Column::Id).count(), "count")
                .filter(ratings::Column::RelatedType.eq(related_type))
                .filter(ratings::Column::RelatedId.eq(related_id))
                .group_by(ratings::Column::Rating)
                .into_model::<RatingDistRow>()
                .all(&self.db)
                .await
                .map_err(DatabaseError::from)
        })
        .await
    }

    /// Count ratings per (entity, value) for many entities in one query
    pub async fn rating_distribution_by_ids(
        &self,
        ctx: &RequestContext,
        related_type: RatingRelatedType,
        related_ids: &[i64],
    ) -> DatabaseResult<Vec<RatingDistRowById>> {
        if related_ids.is_empty() {
            return Ok(Vec::new());
        }

        ctx.run(async {
            ratings::Entity::find()
                .select_only()
                .column(ratings::Column::RelatedId)
                .column(ratings::Column::Rating)
                .column_as(Expr::col(ratings::Column::Id).count(), "count")
                .filter(ratings::Column::RelatedType.eq(related_type))
                .filter(ratings::Column::RelatedId.is_in(related_ids.iter().copied()))
                .group_by(ratings::Column::Rating)
                .group_by(ratings::Column::RelatedId)
                .into_model::<RatingDistRowById>()
                .all(&self.db)
                .await
                .map_err(DatabaseError::from)
        })
        .await
    }
}

fn check_rating_range(rating: i32) -> DatabaseResult<()> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(DatabaseError::Constraint(format!(
            "rating {rating} outside {MIN_RATING}..={MAX_RATING}"
        )))
    }
}
