use crate::{App, Config, shutdown::ShutdownCoordinator};
use tracing::info;

pub async fn handle_worker_command(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::new(config.clone()).await?;

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.spawn_signal_listener();

    info!("Starting worker (press Ctrl+C to stop)");
    let result = app.run_worker(&shutdown).await;
    listener.abort();

    result?;
    Ok(())
}
