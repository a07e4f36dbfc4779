//! Background job dispatcher
//!
//! Tasks are JSON documents pushed onto named queues held by a broker (the
//! same Redis endpoint as the cache). A [`WorkerServer`] pulls from the queues
//! in weighted order and routes each task to the handler registered on a
//! [`ServeMux`]. Failed tasks are archived, never retried.

pub mod broker;
pub mod client;
pub mod config;
pub mod handlers;
pub mod mux;
pub mod server;

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use broker::{ArchivedTask, Broker};
pub use client::QueueClient;
pub use config::QueueConfig;
pub use handlers::RefreshRatingInfoHandler;
pub use mux::ServeMux;
pub use server::WorkerServer;

/// Queue error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("Invalid queue configuration: {0}")]
    Config(String),
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Handler error: {0}")]
    Handler(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Broker(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

/// A unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Routing key, e.g. `rating:refresh`
    pub task_type: String,
    pub payload: serde_json::Value,
    /// Queue the task was enqueued on, set by the client
    #[serde(default)]
    pub queue: String,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            queue: String::new(),
            enqueued_at: Utc::now(),
        }
    }

    /// Build a task from any serializable payload
    pub fn with_payload<P: Serialize>(task_type: impl Into<String>, payload: &P) -> QueueResult<Self> {
        Ok(Self::new(task_type, serde_json::to_value(payload)?))
    }

    /// Decode the payload into `P`
    pub fn payload_as<P: DeserializeOwned>(&self) -> QueueResult<P> {
        serde_json::from_value(self.payload.clone()).map_err(QueueError::from)
    }
}

/// Handler for one family of task types
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handler name for logging
    fn name(&self) -> &str;

    async fn process(&self, task: &Task) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: i64,
    }

    #[test]
    fn test_task_payload_round_trip() {
        let task = Task::with_payload("rating:refresh", &Payload { id: 3 }).unwrap();

        assert_eq!(task.task_type, "rating:refresh");
        assert!(task.queue.is_empty());
        assert_eq!(task.payload_as::<Payload>().unwrap(), Payload { id: 3 });
    }

    #[test]
    fn test_task_payload_mismatch() {
        let task = Task::new("rating:refresh", serde_json::json!({"id": "three"}));
        assert!(matches!(
            task.payload_as::<Payload>(),
            Err(QueueError::Serialization(_))
        ));
    }

    #[test]
    fn test_task_decodes_without_queue_field() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "task_type": "noop",
            "payload": null,
            "enqueued_at": "2024-03-01T00:00:00Z",
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.queue, "");
    }
}
