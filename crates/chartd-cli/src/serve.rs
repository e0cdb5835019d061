//! `chartd serve` — run the scheduler daemon until interrupted.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::context;

pub async fn run(database: Option<PathBuf>) -> anyhow::Result<()> {
    let services = context::build(database)?;

    let registered = services.scheduler.start().await?;
    info!("chartd scheduler running, {registered} jobs registered");

    // Commands that exited cleanly without reporting back leave tasks
    // running across restarts; surface them rather than guessing an outcome.
    let stuck = services.storage.count_running_tasks().await?;
    if stuck > 0 {
        warn!(
            "{stuck} tasks are still marked running; complete them with \
             `chartd task finish <task-id> --state success|failure`"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
