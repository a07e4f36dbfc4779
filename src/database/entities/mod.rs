pub mod ratings;

pub use ratings::Entity as Ratings;
pub use ratings::{MAX_RATING, MIN_RATING, RatingRelatedType};

// Type aliases
pub type RatingRecord = ratings::Model;
