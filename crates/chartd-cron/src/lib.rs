//! chartd-cron: Job scheduling and execution.
//!
//! Bridges persisted job definitions to live, cron-triggered child-process
//! execution. Three things are kept consistent: the stored job definition,
//! the in-memory cron registration, and the task log recording every
//! execution attempt.
//!
//! Consistency between store and scheduler is maintained by ordering, not
//! transactions: jobs are scheduled before they are persisted, and their
//! registrations are cancelled before their records are deleted.

pub mod error;
pub mod jobs;
pub mod runner;
pub mod scheduler;
pub mod tasks;

pub use error::{Result, ServiceError, Violation};
pub use jobs::JobService;
pub use runner::CommandRunner;
pub use scheduler::Scheduler;
pub use tasks::TaskService;
