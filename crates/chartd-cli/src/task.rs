//! `chartd task` — inspect and complete task executions.
//!
//! `finish` is the self-report path: job commands receive their task id as
//! the final argument and call back here (or through the services) to move
//! the task out of the running state. A clean process exit alone never
//! implies success.

use std::path::PathBuf;

use clap::Subcommand;

use crate::context::{self, print_result};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List every execution attempt of a job
    List {
        /// Job id
        job_id: String,
    },
    /// Move a task to a terminal state
    Finish {
        /// Task id
        id: String,

        /// Terminal state: "success" or "failure"
        #[arg(long)]
        state: String,

        /// Error message to record alongside a failure
        #[arg(long)]
        error: Option<String>,
    },
}

pub async fn run(command: TaskCommands, database: Option<PathBuf>) -> anyhow::Result<()> {
    let services = context::build(database)?;

    match command {
        TaskCommands::List { job_id } => {
            print_result(services.tasks.get_all_by_job_id(&job_id).await)
        }
        TaskCommands::Finish { id, state, error } => {
            print_result(services.tasks.update_one(&id, &state, error).await)
        }
    }
}
