use super::{QueueError, QueueResult, Task};
use crate::cache::CacheConfig;
use crate::queue::QueueConfig;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Archived entries kept before the oldest are dropped
pub const MAX_ARCHIVED: usize = 1000;

/// A task that failed or could not be routed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTask {
    /// The decoded task, or the raw payload as a string when it did not decode
    pub task: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl ArchivedTask {
    pub fn new(raw: &str, error: impl Into<String>) -> Self {
        let task = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        Self {
            task,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Queue storage shared by producers and the worker server
#[derive(Clone)]
pub enum Broker {
    Redis(RedisBroker),
    Memory(MemoryBroker),
}

impl Broker {
    /// Broker on the cache endpoint; the memory cache backend gets an in-process broker
    pub async fn new_from_config(cache: &CacheConfig, queue: &QueueConfig) -> QueueResult<Self> {
        match cache.backend.as_str() {
            "redis" => Ok(Broker::Redis(
                RedisBroker::connect(&cache.redis_url(), &queue.key_prefix).await?,
            )),
            "memory" => Ok(Broker::Memory(MemoryBroker::new())),
            other => Err(QueueError::Config(format!(
                "no queue broker for cache backend '{other}'"
            ))),
        }
    }

    pub async fn push(&self, queue: &str, payload: String) -> QueueResult<()> {
        match self {
            Broker::Redis(broker) => broker.push(queue, payload).await,
            Broker::Memory(broker) => broker.push(queue, payload).await,
        }
    }

    /// Pop the oldest payload of a queue
    pub async fn pop(&self, queue: &str) -> QueueResult<Option<String>> {
        match self {
            Broker::Redis(broker) => broker.pop(queue).await,
            Broker::Memory(broker) => broker.pop(queue).await,
        }
    }

    pub async fn archive(&self, entry: &ArchivedTask) -> QueueResult<()> {
        let payload = serde_json::to_string(entry)?;
        match self {
            Broker::Redis(broker) => broker.archive(payload).await,
            Broker::Memory(broker) => broker.archive(payload).await,
        }
    }

    /// Most recent archived entries, newest first
    pub async fn archived(&self, limit: usize) -> QueueResult<Vec<ArchivedTask>> {
        let raw = match self {
            Broker::Redis(broker) => broker.archived(limit).await?,
            Broker::Memory(broker) => broker.archived(limit).await,
        };
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(QueueError::from))
            .collect()
    }

    pub async fn size(&self, queue: &str) -> QueueResult<usize> {
        match self {
            Broker::Redis(broker) => broker.size(queue).await,
            Broker::Memory(broker) => Ok(broker.size(queue).await),
        }
    }

    pub async fn ping(&self) -> QueueResult<()> {
        match self {
            Broker::Redis(broker) => broker.ping().await,
            Broker::Memory(_) => Ok(()),
        }
    }
}

/// Redis lists as queues: LPUSH to enqueue, RPOP to dequeue
#[derive(Clone)]
pub struct RedisBroker {
    connection: MultiplexedConnection,
    key_prefix: String,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str, key_prefix: &str) -> QueueResult<Self> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}queue:{}", self.key_prefix, queue)
    }

    fn archive_key(&self) -> String {
        format!("{}archived", self.key_prefix)
    }

    async fn push(&self, queue: &str, payload: String) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.lpush(self.queue_key(queue), payload).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> QueueResult<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.rpop(self.queue_key(queue), None).await?)
    }

    async fn archive(&self, payload: String) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let key = self.archive_key();
        let _: i64 = conn.lpush(&key, payload).await?;
        let _: () = conn.ltrim(&key, 0, MAX_ARCHIVED as isize - 1).await?;
        Ok(())
    }

    async fn archived(&self, limit: usize) -> QueueResult<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        Ok(conn
            .lrange(self.archive_key(), 0, limit as isize - 1)
            .await?)
    }

    async fn size(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        Ok(conn.llen(self.queue_key(queue)).await?)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-process broker for tests and single-process runs
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    archive: Arc<Mutex<VecDeque<String>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn push(&self, queue: &str, payload: String) -> QueueResult<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> QueueResult<Option<String>> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn archive(&self, payload: String) -> QueueResult<()> {
        let mut archive = self.archive.lock().await;
        archive.push_front(payload);
        archive.truncate(MAX_ARCHIVED);
        Ok(())
    }

    async fn archived(&self, limit: usize) -> Vec<String> {
        let archive = self.archive.lock().await;
        archive.iter().take(limit).cloned().collect()
    }

    async fn size(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map_or(0, VecDeque::len)
    }
}

impl From<MemoryBroker> for Broker {
    fn from(broker: MemoryBroker) -> Self {
        Broker::Memory(broker)
    }
}

impl From<RedisBroker> for Broker {
    fn from(broker: RedisBroker) -> Self {
        Broker::Redis(broker)
    }
}

/// Encode a task for the wire
pub(crate) fn encode(task: &Task) -> QueueResult<String> {
    serde_json::to_string(task).map_err(QueueError::from)
}
