use super::broker::{ArchivedTask, Broker};
use super::{QueueConfig, QueueResult, ServeMux, Task};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Decides which queue is polled first on each fetch
///
/// In weighted mode every queue appears `weight` times in a pool that is
/// shuffled and deduplicated, so a queue is polled first with probability
/// proportional to its weight. Strict mode always uses the priority order.
pub struct LaneSelector {
    weighted: Vec<String>,
    priority: Vec<String>,
    strict: bool,
    rng: StdRng,
}

impl LaneSelector {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn with_rng(config: &QueueConfig, rng: StdRng) -> Self {
        let weighted = config
            .queues
            .iter()
            .flat_map(|(name, weight)| std::iter::repeat_n(name.clone(), *weight as usize))
            .collect();

        Self {
            weighted,
            priority: config.queues_by_priority(),
            strict: config.strict_priority,
            rng,
        }
    }

    /// Queue names in the order they should be polled
    pub fn order(&mut self) -> Vec<String> {
        if self.strict {
            return self.priority.clone();
        }

        let mut pool = self.weighted.clone();
        pool.shuffle(&mut self.rng);

        let mut order: Vec<String> = Vec::with_capacity(self.priority.len());
        for name in pool {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }
}

/// Archive error recorded for tasks cut off by the shutdown grace period
pub const ABORTED_ON_SHUTDOWN: &str = "aborted on shutdown";

/// Spawned executions and the raw payload each one popped
#[derive(Default)]
struct InFlight {
    workers: JoinSet<()>,
    payloads: HashMap<task::Id, String>,
}

impl InFlight {
    fn spawn<F>(&mut self, raw: String, execution: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.workers.spawn(execution);
        self.payloads.insert(handle.id(), raw);
    }

    fn len(&self) -> usize {
        self.workers.len()
    }

    /// Forget a joined execution, handing back its payload if it was aborted
    fn settle(&mut self, joined: Result<(task::Id, ()), JoinError>) -> Option<String> {
        match joined {
            Ok((id, ())) => {
                self.payloads.remove(&id);
                None
            }
            Err(e) => {
                let raw = self.payloads.remove(&e.id());
                if e.is_cancelled() {
                    raw
                } else {
                    error!("Worker task failed to join: {}", e);
                    None
                }
            }
        }
    }

    fn reap(&mut self) {
        while let Some(joined) = self.workers.try_join_next_with_id() {
            self.settle(joined);
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Worker pool pulling tasks from the broker
pub struct WorkerServer {
    broker: Broker,
    config: QueueConfig,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl WorkerServer {
    pub fn new(broker: Broker, config: QueueConfig) -> Self {
        Self {
            broker,
            config,
            shutdown_rx: None,
        }
    }

    /// Stop pulling tasks once `shutdown_rx` turns `true`
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Process tasks until shutdown
    ///
    /// Configuration and broker problems are returned before any task is
    /// pulled. Afterwards poll failures are logged and retried on the next
    /// poll interval.
    pub async fn run(&self, mux: ServeMux) -> QueueResult<()> {
        self.config.validate()?;
        self.broker.ping().await?;

        if mux.is_empty() {
            warn!("Worker server started without any registered handlers");
        }

        info!(
            "Worker server started: concurrency {}, queues {:?}, strict priority {}",
            self.config.concurrency, self.config.queues, self.config.strict_priority
        );

        let mux = Arc::new(mux);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut in_flight = InFlight::default();
        let mut lanes = LaneSelector::new(&self.config);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if is_shutdown(&shutdown_rx) {
                break;
            }

            in_flight.reap();

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            };

            match self.next_task(&mut lanes).await {
                Ok(Some((queue, raw))) => {
                    let broker = self.broker.clone();
                    let mux = mux.clone();
                    in_flight.spawn(raw.clone(), async move {
                        execute(&broker, mux, &queue, raw).await;
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to poll queues: {}", e),
            }

            drop(permit);
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
        }

        info!("Worker server stopping, {} task(s) in flight", in_flight.len());
        self.drain(in_flight).await;
        info!("Worker server stopped");
        Ok(())
    }

    async fn next_task(&self, lanes: &mut LaneSelector) -> QueueResult<Option<(String, String)>> {
        for queue in lanes.order() {
            if let Some(raw) = self.broker.pop(&queue).await? {
                return Ok(Some((queue, raw)));
            }
        }
        Ok(None)
    }

    /// Wait out the grace period, then abort and archive whatever is left
    async fn drain(&self, mut in_flight: InFlight) {
        if in_flight.workers.is_empty() {
            return;
        }

        let grace = self.config.shutdown_timeout();
        let finished = tokio::time::timeout(grace, async {
            while let Some(joined) = in_flight.workers.join_next_with_id().await {
                in_flight.settle(joined);
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                "Aborting {} task(s) still running after {:?}",
                in_flight.len(),
                grace
            );
            in_flight.workers.abort_all();
            while let Some(joined) = in_flight.workers.join_next_with_id().await {
                if let Some(raw) = in_flight.settle(joined) {
                    archive(&self.broker, &raw, ABORTED_ON_SHUTDOWN.to_string()).await;
                }
            }
        }
    }
}

fn is_shutdown(shutdown_rx: &Option<watch::Receiver<bool>>) -> bool {
    shutdown_rx.as_ref().is_some_and(|rx| *rx.borrow())
}

async fn wait_for_shutdown(shutdown_rx: &mut Option<watch::Receiver<bool>>) {
    match shutdown_rx {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Decode and dispatch one task, archiving it on failure
async fn execute(broker: &Broker, mux: Arc<ServeMux>, queue: &str, raw: String) {
    let task: Task = match serde_json::from_str(&raw) {
        Ok(task) => task,
        Err(e) => {
            error!("Dropping undecodable task from queue '{}': {}", queue, e);
            archive(broker, &raw, format!("undecodable task: {e}")).await;
            return;
        }
    };

    debug!("Processing task {} ({}) from '{}'", task.id, task.task_type, queue);
    let started = Instant::now();

    // Run on its own task so a panicking handler is archived like a failing one.
    // The guard ties the handler's lifetime to this execution.
    let task_id = task.id;
    let task_type = task.task_type.clone();
    let mut handler = AbortOnDrop(tokio::spawn(async move { mux.dispatch(&task).await }));
    let outcome = (&mut handler.0).await;

    let failure = match outcome {
        Ok(Ok(())) => {
            info!(
                "Task {} ({}) completed in {:?}",
                task_id,
                task_type,
                started.elapsed()
            );
            return;
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => "handler panicked".to_string(),
        Err(e) => e.to_string(),
    };

    error!("Task {} ({}) failed: {}", task_id, task_type, failure);
    archive(broker, &raw, failure).await;
}

async fn archive(broker: &Broker, raw: &str, error: String) {
    if let Err(e) = broker.archive(&ArchivedTask::new(raw, error)).await {
        error!("Failed to archive task: {}", e);
    }
}
