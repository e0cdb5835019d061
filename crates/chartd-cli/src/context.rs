//! Shared service wiring for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use chartd_cron::{CommandRunner, JobService, Scheduler, TaskService};
use chartd_store::ChartdStorage;

pub struct Services {
    pub storage: Arc<ChartdStorage>,
    pub scheduler: Arc<Scheduler>,
    pub jobs: JobService,
    pub tasks: Arc<TaskService>,
}

/// Open the store and wire up the scheduler and services.
pub fn build(database: Option<PathBuf>) -> anyhow::Result<Services> {
    let config = chartd_config::load_config().unwrap_or_default();
    let db_path = match database {
        Some(path) => path,
        None => config.database_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let storage = Arc::new(ChartdStorage::open(&db_path)?);
    let tasks = Arc::new(TaskService::new(storage.clone()));
    let scheduler = Scheduler::new(
        storage.clone(),
        tasks.clone(),
        CommandRunner::new(config.scheduler.shell.clone()),
    );
    let jobs = JobService::new(storage.clone(), scheduler.clone());

    Ok(Services {
        storage,
        scheduler,
        jobs,
        tasks,
    })
}

/// Print a service result as pretty JSON, or its structured failure body on
/// stderr with a non-zero exit.
pub fn print_result<T: serde::Serialize>(result: chartd_cron::Result<T>) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&e.to_body())?);
            std::process::exit(1);
        }
    }
}
