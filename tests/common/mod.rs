#![allow(dead_code, unused_macros)]

use course_review::App;
use course_review::test_utils::TestAppBuilder;

/// App over in-memory SQLite, memory cache and memory broker
pub async fn test_app() -> App {
    TestAppBuilder::new().build().await
}

/// Redis URL for integration tests
///
/// Returns `None` (the caller skips) when `TEST_REDIS_URL` is unset and the
/// default local server is unreachable. When the variable is set, connection
/// failures are real failures.
pub async fn redis_url() -> Option<String> {
    let explicit = std::env::var("TEST_REDIS_URL").ok();
    let url = explicit
        .clone()
        .unwrap_or_else(|| "redis://localhost:6379/0".to_string());

    match course_review::cache::RedisCache::connect(&url).await {
        Ok(_) => Some(url),
        Err(e) if explicit.is_some() => {
            panic!("Redis connection failed (TEST_REDIS_URL is set): {}", e)
        }
        Err(e) => {
            println!("Redis not available, skipping test: {}", e);
            None
        }
    }
}

macro_rules! require_redis {
    () => {
        match common::redis_url().await {
            Some(url) => url,
            None => return,
        }
    };
}
