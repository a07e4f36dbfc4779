//! Rating distribution and summary statistics
//!
//! Raw grouped rows from the store are reduced into [`RatingInfo`] values.
//! The reduction merges duplicate rating groups, so it gives the same result
//! regardless of the order or splitting of its input rows.

use crate::cache::CachedObject;
use crate::database::{RatingDistRow, RatingDistRowById};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub mod aggregator;
pub mod service;
pub mod store;

pub use crate::database::entities::{RatingRecord, RatingRelatedType};
pub use aggregator::RatingAggregator;
pub use service::RatingService;
pub use store::{MockRatingStore, RatingStore};

/// Number of ratings with a given value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDistItem {
    pub rating: i32,
    pub count: i64,
}

/// Rating distribution plus derived count and mean
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingInfo {
    pub average: f64,
    pub count: i64,
    pub rating_dist: Vec<RatingDistItem>,
}

impl RatingInfo {
    /// Reduce distribution items, highest rating first
    pub fn from_dist<I>(items: I) -> Self
    where
        I: IntoIterator<Item = RatingDistItem>,
    {
        let mut grouped: BTreeMap<i32, i64> = BTreeMap::new();
        for item in items {
            *grouped.entry(item.rating).or_insert(0) += item.count;
        }

        let rating_dist: Vec<RatingDistItem> = grouped
            .into_iter()
            .rev()
            .map(|(rating, count)| RatingDistItem { rating, count })
            .collect();

        let mut info = Self {
            average: 0.0,
            count: 0,
            rating_dist,
        };
        info.calc();
        info
    }

    /// Recompute `count` and `average` from `rating_dist`
    pub fn calc(&mut self) {
        let mut total_count: i64 = 0;
        let mut total_rating: i64 = 0;
        for item in &self.rating_dist {
            total_count += item.count;
            total_rating += i64::from(item.rating) * item.count;
        }

        self.count = total_count;
        self.average = if total_count == 0 {
            0.0
        } else {
            total_rating as f64 / total_count as f64
        };
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl CachedObject for RatingInfo {
    fn cache_prefix() -> &'static str {
        "rating_info"
    }

    fn default_ttl() -> Option<Duration> {
        Some(Duration::from_secs(300))
    }
}

impl From<RatingDistRow> for RatingDistItem {
    fn from(row: RatingDistRow) -> Self {
        Self {
            rating: row.rating,
            count: row.count,
        }
    }
}

/// Partition rows by entity id and reduce each partition
///
/// Entities without rows do not appear in the result.
pub fn group_by_related_id<I>(rows: I) -> HashMap<i64, RatingInfo>
where
    I: IntoIterator<Item = RatingDistRowById>,
{
    let mut partitions: HashMap<i64, Vec<RatingDistItem>> = HashMap::new();
    for row in rows {
        partitions
            .entry(row.related_id)
            .or_default()
            .push(RatingDistItem {
                rating: row.rating,
                count: row.count,
            });
    }

    partitions
        .into_iter()
        .map(|(related_id, items)| (related_id, RatingInfo::from_dist(items)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(rating: i32, count: i64) -> RatingDistItem {
        RatingDistItem { rating, count }
    }

    #[test]
    fn test_from_dist_basic() {
        let info = RatingInfo::from_dist(vec![item(3, 1), item(5, 2)]);

        assert_eq!(info.rating_dist, vec![item(5, 2), item(3, 1)]);
        assert_eq!(info.count, 3);
        assert!((info.average - 13.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_dist_empty_has_zero_mean() {
        let info = RatingInfo::from_dist(Vec::new());

        assert!(info.rating_dist.is_empty());
        assert_eq!(info.count, 0);
        assert_eq!(info.average, 0.0);
        assert!(info.is_empty());
        assert_eq!(info, RatingInfo::default());
    }

    #[test]
    fn test_from_dist_merges_split_groups() {
        let split = RatingInfo::from_dist(vec![item(4, 1), item(2, 3), item(4, 2)]);
        let merged = RatingInfo::from_dist(vec![item(2, 3), item(4, 3)]);

        assert_eq!(split, merged);
        assert_eq!(split.count, 6);
    }

    #[test]
    fn test_from_dist_order_independent() {
        let rows = vec![item(1, 4), item(5, 9), item(3, 2), item(2, 7), item(4, 1)];
        let expected = RatingInfo::from_dist(rows.clone());

        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(RatingInfo::from_dist(reversed), expected);

        let mut rotated = rows;
        rotated.rotate_left(2);
        assert_eq!(RatingInfo::from_dist(rotated), expected);
    }

    #[test]
    fn test_distribution_partitions_all_records() {
        let values = [5, 5, 3, 1, 4, 4, 4, 2, 5, 3];
        let items: Vec<RatingDistItem> = values.iter().map(|v| item(*v, 1)).collect();
        let info = RatingInfo::from_dist(items);

        let sum: i64 = info.rating_dist.iter().map(|d| d.count).sum();
        assert_eq!(sum, values.len() as i64);
        assert_eq!(info.count, values.len() as i64);

        let expected_mean = values.iter().sum::<i32>() as f64 / values.len() as f64;
        assert!((info.average - expected_mean).abs() < 1e-9);
    }

    #[test]
    fn test_calc_recomputes_summary() {
        let mut info = RatingInfo {
            average: 99.0,
            count: 99,
            rating_dist: vec![item(2, 2), item(4, 2)],
        };
        info.calc();

        assert_eq!(info.count, 4);
        assert_eq!(info.average, 3.0);
    }

    #[test]
    fn test_group_by_related_id() {
        let rows = vec![
            RatingDistRowById {
                related_id: 42,
                rating: 5,
                count: 2,
            },
            RatingDistRowById {
                related_id: 7,
                rating: 1,
                count: 1,
            },
            RatingDistRowById {
                related_id: 42,
                rating: 3,
                count: 1,
            },
        ];

        let grouped = group_by_related_id(rows);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&42].count, 3);
        assert_eq!(grouped[&42].rating_dist, vec![item(5, 2), item(3, 1)]);
        assert_eq!(grouped[&7].average, 1.0);
        assert!(!grouped.contains_key(&99));
    }

    #[test]
    fn test_rating_info_json_shape() {
        let info = RatingInfo::from_dist(vec![item(5, 1)]);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["count"], 1);
        assert_eq!(json["average"], 5.0);
        assert_eq!(json["rating_dist"][0]["rating"], 5);
    }
}
