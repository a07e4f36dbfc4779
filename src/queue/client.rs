use super::broker::{ArchivedTask, Broker, encode};
use super::{QueueConfig, QueueError, QueueResult, Task};

/// Producer side of the dispatcher
#[derive(Clone)]
pub struct QueueClient {
    broker: Broker,
    config: QueueConfig,
}

impl QueueClient {
    pub fn new(broker: Broker, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    /// Push `task` onto `queue`, returning the task as stored
    ///
    /// Only queues present in the configuration are accepted.
    pub async fn enqueue(&self, mut task: Task, queue: &str) -> QueueResult<Task> {
        if !self.config.has_queue(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }

        task.queue = queue.to_string();
        self.broker.push(queue, encode(&task)?).await?;

        tracing::debug!(
            "Enqueued task {} ({}) on queue '{}'",
            task.id,
            task.task_type,
            queue
        );
        Ok(task)
    }

    /// Pending task count per configured queue, heaviest queue first
    pub async fn queue_sizes(&self) -> QueueResult<Vec<(String, usize)>> {
        let mut sizes = Vec::with_capacity(self.config.queues.len());
        for queue in self.config.queues_by_priority() {
            let size = self.broker.size(&queue).await?;
            sizes.push((queue, size));
        }
        Ok(sizes)
    }

    pub async fn archived(&self, limit: usize) -> QueueResult<Vec<ArchivedTask>> {
        self.broker.archived(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::broker::MemoryBroker;

    fn client() -> (QueueClient, Broker) {
        let broker = Broker::from(MemoryBroker::new());
        (
            QueueClient::new(broker.clone(), QueueConfig::default()),
            broker,
        )
    }

    #[tokio::test]
    async fn test_enqueue_sets_queue_and_pushes() {
        let (client, broker) = client();
        let task = Task::new("rating:refresh", serde_json::json!({"related_id": 1}));

        let stored = client.enqueue(task.clone(), "critical").await.unwrap();
        assert_eq!(stored.id, task.id);
        assert_eq!(stored.queue, "critical");

        let raw = broker.pop("critical").await.unwrap().unwrap();
        let decoded: Task = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, stored);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unknown_queue() {
        let (client, broker) = client();
        let task = Task::new("rating:refresh", serde_json::Value::Null);

        let err = client.enqueue(task, "urgent").await.unwrap_err();
        assert_eq!(err, QueueError::UnknownQueue("urgent".to_string()));
        assert_eq!(broker.size("urgent").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_sizes_in_priority_order() {
        let (client, _) = client();
        for _ in 0..2 {
            client
                .enqueue(Task::new("noop", serde_json::Value::Null), "low")
                .await
                .unwrap();
        }

        let sizes = client.queue_sizes().await.unwrap();
        assert_eq!(
            sizes,
            vec![
                ("critical".to_string(), 0),
                ("default".to_string(), 0),
                ("low".to_string(), 2),
            ]
        );
    }
}
