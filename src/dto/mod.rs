//! Request and response types shared with the HTTP layer

pub mod training_plan;

use serde::{Deserialize, Serialize};

pub use training_plan::{
    SortDirection, TrainingPlanDetailRequest, TrainingPlanListQueryRequest,
    TrainingPlanListResponse, TrainingPlanSummary,
};

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePaginateResponse<T> {
    pub page: i64,
    pub page_size: i64,
    /// Total number of items across all pages
    pub total: i64,
    pub data: Vec<T>,
}

impl<T> BasePaginateResponse<T> {
    pub fn new(page: i64, page_size: i64, total: i64, data: Vec<T>) -> Self {
        Self {
            page,
            page_size,
            total,
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> BasePaginateResponse<U> {
        BasePaginateResponse {
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            data: self.data.into_iter().map(f).collect(),
        }
    }

    pub fn total_pages(&self) -> i64 {
        if self.page_size <= 0 || self.total <= 0 {
            return 0;
        }
        (self.total - 1) / self.page_size + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_response_shape() {
        let response = BasePaginateResponse::new(2, 10, 25, vec![1, 2, 3]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["page"], 2);
        assert_eq!(json["page_size"], 10);
        assert_eq!(json["total"], 25);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert_eq!(response.total_pages(), 3);
    }

    #[test]
    fn test_map_keeps_paging() {
        let response = BasePaginateResponse::new(1, 2, 2, vec![1, 2]).map(|n| n * 10);
        assert_eq!(response.data, vec![10, 20]);
        assert_eq!(response.total, 2);
        assert_eq!(BasePaginateResponse::<u8>::new(1, 0, 5, vec![]).total_pages(), 0);
    }

    #[test]
    fn test_total_pages_edges() {
        assert_eq!(BasePaginateResponse::<u8>::new(1, 10, 0, vec![]).total_pages(), 0);
        assert_eq!(BasePaginateResponse::<u8>::new(1, 10, 10, vec![]).total_pages(), 1);
        assert_eq!(BasePaginateResponse::<u8>::new(1, 10, 11, vec![]).total_pages(), 2);
        assert_eq!(
            BasePaginateResponse::<u8>::new(1, 1, i64::MAX, vec![]).total_pages(),
            i64::MAX
        );
        assert_eq!(
            BasePaginateResponse::<u8>::new(1, 100, i64::MAX, vec![]).total_pages(),
            i64::MAX / 100 + 1
        );
    }
}
