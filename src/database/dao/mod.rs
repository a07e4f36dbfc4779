pub mod ratings;

pub use ratings::{RatingDistRow, RatingDistRowById, RatingsDao};
