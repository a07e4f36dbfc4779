pub mod job;
pub mod migrate;
pub mod rating;
pub mod worker;

use crate::Config;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: migrate::MigrateAction,
    },
    /// Run the background worker until interrupted
    Worker,
    /// Enqueue and inspect background tasks
    Job {
        #[command(subcommand)]
        command: job::JobCommand,
    },
    /// Inspect aggregated ratings
    Rating {
        #[command(subcommand)]
        command: rating::RatingCommand,
    },
}

pub async fn handle_command(
    command: Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Migrate { action } => migrate::handle_migrate_command(action, config).await,
        Commands::Worker => worker::handle_worker_command(config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Rating { command } => rating::handle_rating_command(command, config).await,
    }
}
