use crate::cache::CacheError;
use crate::database::DatabaseError;
use crate::queue::QueueError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(config::ConfigError),
    Database(DatabaseError),
    Cache(CacheError),
    Queue(QueueError),
    BadRequest(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "Configuration error: {}", err),
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Cache(err) => write!(f, "Cache error: {}", err),
            AppError::Queue(err) => write!(f, "Queue error: {}", err),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Database(err) => Some(err),
            AppError::Cache(err) => Some(err),
            AppError::Queue(err) => Some(err),
            AppError::BadRequest(_) | AppError::Internal(_) => None,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let config_err = AppError::Config(config::ConfigError::NotFound("test".to_string()));
        assert!(config_err.to_string().contains("Configuration error"));

        let db_err = AppError::from(DatabaseError::Constraint("duplicate".to_string()));
        assert!(db_err.to_string().starts_with("Database error"));
        assert!(db_err.to_string().contains("duplicate"));

        let cache_err = AppError::from(CacheError::Cancelled);
        assert!(cache_err.to_string().contains("cancelled"));

        let bad = AppError::BadRequest("missing field".to_string());
        assert_eq!(bad.to_string(), "Bad request: missing field");
    }

    #[test]
    fn test_json_error_maps_to_bad_request() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = AppError::from(QueueError::UnknownQueue("urgent".to_string()));
        assert!(err.source().is_some());
        assert!(AppError::Internal("x".to_string()).source().is_none());
    }
}
