//! Database access layer with domain-specific DAOs
//!
//! Persistence is delegated to a relational database reached through sea-orm.
//! Each domain gets its own DAO; the manager hands out DAOs sharing one pool.

use crate::context::Cancelled;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, DatabaseConnection, DbErr, SqlErr};
use thiserror::Error;

pub mod config;
pub mod dao;
pub mod entities;
pub mod migration;

pub use config::DatabaseConfig;
pub use dao::{RatingDistRow, RatingDistRowById, RatingsDao};

/// Database error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Migration error: {0}")]
    Migration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<DbErr> for DatabaseError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg))
            | Some(SqlErr::ForeignKeyConstraintViolation(msg)) => DatabaseError::Constraint(msg),
            _ => DatabaseError::Database(err.to_string()),
        }
    }
}

impl From<Cancelled> for DatabaseError {
    fn from(_: Cancelled) -> Self {
        DatabaseError::Cancelled
    }
}

/// Database manager trait for dependency injection and testing
#[async_trait]
pub trait DatabaseManager: Send + Sync {
    /// Run database migrations
    async fn migrate(&self) -> DatabaseResult<()>;

    /// Health check for database connection
    async fn health_check(&self) -> DatabaseResult<()>;

    /// Get ratings DAO
    fn ratings(&self) -> RatingsDao;

    /// Get direct database connection (for migrations and admin operations)
    fn connection(&self) -> &DatabaseConnection;
}

/// Database connection manager implementation
pub struct DatabaseManagerImpl {
    pub connection: DatabaseConnection,
}

impl DatabaseManagerImpl {
    /// Open a connection pool from configuration
    pub async fn new_from_config(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(config.max_connections)
            .sqlx_logging(config.sql_logging);

        let connection = sea_orm::Database::connect(options)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        tracing::info!("Connected to database");

        Ok(Self { connection })
    }
}

#[async_trait]
impl DatabaseManager for DatabaseManagerImpl {
    async fn migrate(&self) -> DatabaseResult<()> {
        use crate::database::migration::Migrator;
        use sea_orm_migration::MigratorTrait;

        tracing::info!("Running database migrations");

        Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Successfully completed all migrations");
        Ok(())
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        self.connection
            .ping()
            .await
            .map_err(|e| DatabaseError::Database(format!("db error: {}", e)))
    }

    fn ratings(&self) -> RatingsDao {
        RatingsDao::new(self.connection.clone())
    }

    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_maps_to_cancelled_variant() {
        let err: DatabaseError = Cancelled.into();
        assert_eq!(err, DatabaseError::Cancelled);
    }

    #[test]
    fn test_generic_db_error_maps_to_database_variant() {
        let err: DatabaseError = DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, DatabaseError::Database(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_health_check_on_open_pool() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        };
        let manager = DatabaseManagerImpl::new_from_config(&config).await.unwrap();
        manager.health_check().await.unwrap();
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DatabaseError::Constraint("duplicate".to_string()).to_string(),
            "Constraint violation: duplicate"
        );
        assert_eq!(DatabaseError::Cancelled.to_string(), "Operation cancelled");
    }
}
