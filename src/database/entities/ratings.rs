use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, sea_query::StringLen};
use serde::{Deserialize, Serialize};

/// Lowest accepted rating value
pub const MIN_RATING: i32 = 1;
/// Highest accepted rating value
pub const MAX_RATING: i32 = 5;

/// Kind of entity a rating is attached to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RatingRelatedType {
    #[sea_orm(string_value = "course")]
    #[serde(rename = "course")]
    Course,
    #[sea_orm(string_value = "teacher")]
    #[serde(rename = "teacher")]
    Teacher,
    #[sea_orm(string_value = "training_plan")]
    #[serde(rename = "training_plan")]
    TrainingPlan,
}

impl RatingRelatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingRelatedType::Course => "course",
            RatingRelatedType::Teacher => "teacher",
            RatingRelatedType::TrainingPlan => "training_plan",
        }
    }
}

impl std::fmt::Display for RatingRelatedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RatingRelatedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(RatingRelatedType::Course),
            "teacher" => Ok(RatingRelatedType::Teacher),
            "training_plan" | "trainingplan" => Ok(RatingRelatedType::TrainingPlan),
            other => Err(format!("unknown rating related type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ratings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i64,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub related_type: RatingRelatedType,
    pub related_id: i64,
    pub rating: i32,
    /// Free-form JSON text supplied by the client
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Create a new rating record with required fields
    pub fn new(
        user_id: i64,
        related_type: RatingRelatedType,
        related_id: i64,
        rating: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be auto-assigned by database
            user_id,
            related_type,
            related_id,
            rating,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to attach metadata
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Builder method to set ID (for tests)
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn has_valid_rating(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }

    /// Parse metadata as JSON, `None` when absent
    pub fn metadata_json(&self) -> Option<Result<serde_json::Value, serde_json::Error>> {
        self.metadata.as_deref().map(serde_json::from_str)
    }
}
