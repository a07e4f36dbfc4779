use super::BasePaginateResponse;
use crate::error::AppError;
use crate::rating::RatingInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 100;

pub type TrainingPlanListResponse = BasePaginateResponse<TrainingPlanSummary>;

/// Training plan row shown in list views
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingPlanSummary {
    pub id: i64,
    pub code: String,
    pub major_name: String,
    pub major_code: String,
    pub department: String,
    pub entry_year: String,
    pub degree: String,
    pub total_year: i32,
    pub min_credits: f64,
    pub rating_info: RatingInfo,
}

/// Detail lookup keyed by the path id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPlanDetailRequest {
    #[serde(rename = "trainingPlanID")]
    pub training_plan_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(AppError::BadRequest(format!(
                "invalid sort direction: {other}"
            ))),
        }
    }
}

/// Filters and paging for the training plan list
///
/// Multi-valued filters arrive as comma-separated strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlanListQueryRequest {
    #[serde(default)]
    pub entry_years: String,
    #[serde(default)]
    pub departments: String,
    #[serde(default)]
    pub degrees: String,
    #[serde(default)]
    pub major_name: String,
    #[serde(default)]
    pub major_code: String,
    #[serde(default)]
    pub sort_direction: String,
    #[serde(default)]
    pub sort_by: String,
    pub page: i64,
    pub page_size: i64,
    #[serde(default)]
    pub search_query: String,
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl TrainingPlanListQueryRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            entry_years: String::new(),
            departments: String::new(),
            degrees: String::new(),
            major_name: String::new(),
            major_code: String::new(),
            sort_direction: String::new(),
            sort_by: String::new(),
            page,
            page_size,
            search_query: String::new(),
        }
    }

    /// Check paging bounds and that filters parse
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::BadRequest("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AppError::BadRequest(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        self.entry_year_list()?;
        self.direction()?;
        Ok(())
    }

    pub fn entry_year_list(&self) -> Result<Vec<i32>, AppError> {
        split_csv(&self.entry_years)
            .iter()
            .map(|year| {
                year.parse::<i32>()
                    .map_err(|_| AppError::BadRequest(format!("invalid entry year: {year}")))
            })
            .collect()
    }

    pub fn department_list(&self) -> Vec<String> {
        split_csv(&self.departments)
    }

    pub fn degree_list(&self) -> Vec<String> {
        split_csv(&self.degrees)
    }

    pub fn major_name_filter(&self) -> Option<&str> {
        non_empty(&self.major_name)
    }

    pub fn major_code_filter(&self) -> Option<&str> {
        non_empty(&self.major_code)
    }

    pub fn search(&self) -> Option<&str> {
        non_empty(&self.search_query)
    }

    pub fn sort_field(&self) -> Option<&str> {
        non_empty(&self.sort_by)
    }

    /// Requested direction, descending when omitted
    pub fn direction(&self) -> Result<SortDirection, AppError> {
        match non_empty(&self.sort_direction) {
            Some(value) => value.parse(),
            None => Ok(SortDirection::default()),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Ids of the plans on a page, in order
pub fn training_plan_ids(summaries: &[TrainingPlanSummary]) -> Vec<i64> {
    summaries.iter().map(|summary| summary.id).collect()
}

/// Fill each summary's rating info from a batched lookup
///
/// Plans missing from `infos` have no ratings and get the empty info.
pub fn attach_rating_infos(summaries: &mut [TrainingPlanSummary], infos: &HashMap<i64, RatingInfo>) {
    for summary in summaries {
        summary.rating_info = infos.get(&summary.id).cloned().unwrap_or_default();
    }
}
