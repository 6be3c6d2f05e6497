mod challenge;
mod config;
mod main_lib;
mod secrets;

use config::Config;
use framesync_core::SyncScheduler;
use main_lib::{build_app, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_format);
    let app = build_app(&config)?;
    app.initialize().await?;

    let scheduler = SyncScheduler::new(config.sync_interval_secs, app.clone().task());
    if let Err(e) = scheduler.start().await {
        tracing::error!("Initial sync failed: {}", e);
        app.close().await;
        return Err(e.into());
    }
    tracing::info!(
        "Scheduler running every {} s, press Ctrl-C to stop",
        scheduler.interval_seconds()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.stop();
    app.close().await;
    Ok(())
}
