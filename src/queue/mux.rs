use super::{QueueError, Task, TaskHandler};
use crate::error::AppError;
use std::sync::Arc;

/// Routes tasks to handlers by task type
///
/// A pattern matches every task type it is a prefix of; the longest matching
/// pattern wins, so `rating:` can act as a fallback for `rating:refresh`.
#[derive(Clone, Default)]
pub struct ServeMux {
    routes: Vec<(String, Arc<dyn TaskHandler>)>,
}

impl ServeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`, replacing an earlier registration
    pub fn handle(&mut self, pattern: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
        let pattern = pattern.into();
        tracing::debug!("Registered handler '{}' for '{}'", handler.name(), pattern);

        match self.routes.iter_mut().find(|(p, _)| *p == pattern) {
            Some(route) => route.1 = handler,
            None => self.routes.push((pattern, handler)),
        }
        self
    }

    pub fn handler_for(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.routes
            .iter()
            .filter(|(pattern, _)| task_type.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, handler)| handler)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(pattern, _)| pattern.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the matching handler
    pub async fn dispatch(&self, task: &Task) -> Result<(), AppError> {
        match self.handler_for(&task.task_type) {
            Some(handler) => handler.process(task).await,
            None => Err(AppError::Queue(QueueError::Handler(format!(
                "no handler registered for task type '{}'",
                task.task_type
            )))),
        }
    }
}
