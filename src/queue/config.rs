use super::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Worker pool and queue layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Maximum number of tasks processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Queue name to relative weight
    #[serde(default = "default_queues")]
    pub queues: BTreeMap<String, u32>,
    /// Always drain heavier queues first instead of weighted random order
    #[serde(default)]
    pub strict_priority: bool,
    /// Idle wait between polls when every queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Grace period for in-flight tasks on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_concurrency() -> usize {
    10
}

pub fn default_queues() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("critical".to_string(), 6),
        ("default".to_string(), 3),
        ("low".to_string(), 1),
    ])
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_secs() -> u64 {
    8
}

fn default_key_prefix() -> String {
    "course_review:".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queues: default_queues(),
            strict_priority: false,
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> QueueResult<()> {
        if self.concurrency == 0 {
            return Err(QueueError::Config("concurrency must be positive".to_string()));
        }
        if self.queues.is_empty() {
            return Err(QueueError::Config("no queues configured".to_string()));
        }
        for (name, weight) in &self.queues {
            if name.trim().is_empty() {
                return Err(QueueError::Config("queue name must not be empty".to_string()));
            }
            if *weight == 0 {
                return Err(QueueError::Config(format!(
                    "queue '{name}' must have a positive weight"
                )));
            }
        }
        Ok(())
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Queue names, heaviest first, ties broken by name
    pub fn queues_by_priority(&self) -> Vec<String> {
        let mut lanes: Vec<(&String, &u32)> = self.queues.iter().collect();
        lanes.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        lanes.into_iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = QueueConfig::default();

        assert_eq!(config.concurrency, 10);
        assert_eq!(config.queues["critical"], 6);
        assert_eq!(config.queues["default"], 3);
        assert_eq!(config.queues["low"], 1);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.queues_by_priority(),
            vec!["critical", "default", "low"]
        );
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let zero_workers = QueueConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(zero_workers.validate(), Err(QueueError::Config(_))));

        let no_queues = QueueConfig {
            queues: BTreeMap::new(),
            ..Default::default()
        };
        assert!(no_queues.validate().is_err());

        let mut zero_weight = QueueConfig::default();
        zero_weight.queues.insert("bulk".to_string(), 0);
        assert!(zero_weight.validate().is_err());
    }
}
