//! `chartd job` — manage job definitions.

use std::path::PathBuf;

use clap::Subcommand;

use chartd_types::JobDraft;

use crate::context::{self, print_result};

#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a job
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Cron expression (e.g. "0 0 * * *")
        #[arg(long)]
        expression: String,

        /// Shell command to launch when the job fires
        #[arg(long)]
        command: String,

        /// Create the job without a live schedule
        #[arg(long)]
        disabled: bool,
    },
    /// List every job
    List,
    /// Show one job
    Show { id: String },
    /// Delete a job and its live registration
    Rm { id: String },
    /// Run a job immediately, independent of its schedule
    Run { id: String },
    /// Re-enable a job's schedule
    Enable { id: String },
    /// Disable a job's schedule
    Disable { id: String },
}

pub async fn run(command: JobCommands, database: Option<PathBuf>) -> anyhow::Result<()> {
    let services = context::build(database)?;

    match command {
        JobCommands::Add {
            name,
            expression,
            command,
            disabled,
        } => {
            let draft = JobDraft {
                name: Some(name),
                expression: Some(expression),
                command: Some(command),
                enabled: disabled.then_some(false),
            };
            print_result(services.jobs.create(draft).await)
        }
        JobCommands::List => print_result(services.jobs.all().await),
        JobCommands::Show { id } => print_result(services.jobs.get_one(&id).await),
        JobCommands::Rm { id } => match services.jobs.delete_one(&id).await {
            Ok(()) => {
                println!("deleted {id}");
                Ok(())
            }
            Err(e) => print_result::<()>(Err(e)),
        },
        JobCommands::Run { id } => print_result(services.jobs.run_now(&id).await),
        JobCommands::Enable { id } => print_result(services.jobs.enable(&id, true).await),
        JobCommands::Disable { id } => print_result(services.jobs.enable(&id, false).await),
    }
}
