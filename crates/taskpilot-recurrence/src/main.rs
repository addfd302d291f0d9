use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use taskpilot_core::{SystemClock, TaskpilotConfig};
use taskpilot_recurrence::MaterialiserEngine;
use taskpilot_store::TaskStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpilot_recurrence=info,taskpilot_store=info".into()),
        )
        .init();

    // Load config: explicit path > TASKPILOT_CONFIG env > ~/.taskpilot/taskpilot.toml
    let config_path = std::env::var("TASKPILOT_CONFIG").ok();
    let config = TaskpilotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({e}), using defaults");
        TaskpilotConfig::default()
    });

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = rusqlite::Connection::open(&config.database.path)?;
    let store = Arc::new(TaskStore::new(conn)?);

    let engine = MaterialiserEngine::new(
        store,
        Arc::new(SystemClock),
        Duration::from_secs(config.recurrence.tick_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(db = %config.database.path, "taskpilot recurrence daemon starting");
    engine.run(shutdown_rx).await;

    Ok(())
}
