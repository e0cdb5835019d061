mod context;
mod job;
mod serve;
mod task;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chartd", about = "Chart backend job scheduler")]
struct Cli {
    /// Database file (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon
    Serve,
    /// Manage job definitions
    Job {
        #[command(subcommand)]
        command: job::JobCommands,
    },
    /// Inspect and complete task executions
    Task {
        #[command(subcommand)]
        command: task::TaskCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve => rt.block_on(serve::run(cli.database)),
        Commands::Job { command } => rt.block_on(job::run(command, cli.database)),
        Commands::Task { command } => rt.block_on(task::run(command, cli.database)),
    }
}
