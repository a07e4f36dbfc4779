use crate::{
    Config,
    queue::{Broker, QueueClient, QueueError, Task},
};
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand)]
pub enum JobCommand {
    /// Push a task onto a queue
    Enqueue {
        #[arg(help = "Task type, e.g. rating:refresh")]
        task_type: String,

        #[arg(long, help = "JSON payload", default_value = "{}")]
        payload: String,

        #[arg(long, help = "Target queue", default_value = "default")]
        queue: String,
    },

    /// Show queue sizes and recently archived tasks
    List {
        #[arg(long, help = "Number of archived tasks to show", default_value = "20")]
        limit: usize,
    },
}

/// Job commands talk to workers in other processes, so the broker must be shared
fn require_shared_broker(config: &Config) -> Result<(), QueueError> {
    if config.cache.backend == "memory" {
        return Err(QueueError::Config(
            "job commands need the redis backend; a memory broker only lives inside this process"
                .to_string(),
        ));
    }
    Ok(())
}

pub async fn handle_job_command(
    command: JobCommand,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    require_shared_broker(config)?;
    let broker = Broker::new_from_config(&config.cache, &config.queue).await?;
    let client = QueueClient::new(broker, config.queue.clone());

    match command {
        JobCommand::Enqueue {
            task_type,
            payload,
            queue,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let task = client.enqueue(Task::new(task_type, payload), &queue).await?;

            info!("Enqueued task {} on '{}'", task.id, task.queue);
            println!("{}", task.id);
        }

        JobCommand::List { limit } => {
            println!("Queues:");
            for (queue, size) in client.queue_sizes().await? {
                let weight = config.queue.queues.get(&queue).copied().unwrap_or(0);
                println!("  {:<10} weight {:>3}  pending {}", queue, weight, size);
            }

            let archived = client.archived(limit).await?;
            println!();
            println!("Archived tasks ({}):", archived.len());
            for entry in archived {
                let task_type = entry
                    .task
                    .get("task_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<undecodable>");
                println!(
                    "  {}  {:<20} {}",
                    entry.failed_at.to_rfc3339(),
                    task_type,
                    entry.error
                );
            }
        }
    }

    Ok(())
}
