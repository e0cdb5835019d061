//! Live cron registrations — the bridge between persisted job definitions
//! and in-process, time-triggered execution.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use chartd_store::ChartdStorage;
use chartd_types::{Job, Task};

use crate::error::{Result, ServiceError};
use crate::runner::CommandRunner;
use crate::tasks::TaskService;

/// A live binding of a job id to an active cron trigger.
struct Registration {
    job: Job,
    handle: tokio::task::JoinHandle<()>,
}

/// Owns the in-memory job id → registration table. The scheduler is the
/// sole mutator of live registrations; registrations do not survive a
/// restart and are rebuilt from the job store by [`Scheduler::start`].
pub struct Scheduler {
    registrations: RwLock<HashMap<String, Registration>>,
    storage: Arc<ChartdStorage>,
    tasks: Arc<TaskService>,
    runner: CommandRunner,
}

/// Parse a job's cron expression, surfacing failure as a schedule error
/// rather than a process fault.
///
/// Standard 5-field crontab expressions are accepted by prepending a
/// seconds field of `0`; 6/7-field expressions pass through unchanged.
pub fn parse_expression(expression: &str) -> Result<Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| ServiceError::Schedule(format!("invalid cron expression '{expression}': {e}")))
}

impl Scheduler {
    pub fn new(
        storage: Arc<ChartdStorage>,
        tasks: Arc<TaskService>,
        runner: CommandRunner,
    ) -> Arc<Self> {
        Arc::new(Self {
            registrations: RwLock::new(HashMap::new()),
            storage,
            tasks,
            runner,
        })
    }

    /// Load every job from the store and register the enabled ones.
    ///
    /// Runs once per process lifetime, after the store is reachable. Jobs
    /// whose stored expression no longer parses are skipped with a warning
    /// rather than failing startup. Returns the registration count.
    pub async fn start(self: &Arc<Self>) -> Result<usize> {
        let jobs = self.storage.list_jobs().await?;
        let total = jobs.len();
        let mut registered = 0;

        for job in jobs {
            if !job.enabled {
                continue;
            }
            match self.schedule(&job).await {
                Ok(()) => registered += 1,
                Err(e) => warn!(job_id = %job.id, "skipping unschedulable job: {e}"),
            }
        }

        info!("Scheduler started: {registered} of {total} jobs registered");
        Ok(registered)
    }

    /// Register a live cron trigger for the job's expression.
    ///
    /// At most one registration exists per job id: re-scheduling replaces
    /// the prior registration instead of creating a second.
    pub async fn schedule(self: &Arc<Self>, job: &Job) -> Result<()> {
        let schedule = parse_expression(&job.expression)?;

        let mut registrations = self.registrations.write().await;
        if let Some(old) = registrations.remove(&job.id) {
            old.handle.abort();
            debug!(job_id = %job.id, "replaced prior registration");
        }

        let weak = Arc::downgrade(self);
        let timer_job = job.clone();
        let handle = tokio::spawn(async move {
            let mut after = Utc::now();
            loop {
                let Some(next) = schedule.after(&after).next() else {
                    debug!(job_id = %timer_job.id, "no upcoming occurrence, timer exiting");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                after = next;

                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = scheduler.run_job(&timer_job).await {
                    warn!(job_id = %timer_job.id, "scheduled run failed: {e}");
                }
            }
        });

        registrations.insert(
            job.id.clone(),
            Registration {
                job: job.clone(),
                handle,
            },
        );
        info!(job_id = %job.id, expression = %job.expression, "job scheduled");
        Ok(())
    }

    /// Execute a job immediately, independent of its cron trigger.
    ///
    /// Creates a running task stamped with the job snapshot, then launches
    /// the command without waiting for it. The returned task stays running
    /// until the command (or an external caller) reports a terminal state;
    /// only a launch failure or non-zero exit is recorded here, as failure.
    pub async fn run_job(&self, job: &Job) -> Result<Task> {
        let task = self.tasks.create(job).await?;
        info!(job_id = %job.id, task_id = %task.id, "job fired");
        self.runner
            .spawn(job.command.clone(), task.id.clone(), self.tasks.clone());
        Ok(task)
    }

    /// Cancel the live registration for a job id, if any. Idempotent:
    /// an unregistered id is a no-op, not an error.
    pub async fn delete_job(&self, id: &str) {
        let mut registrations = self.registrations.write().await;
        if let Some(registration) = registrations.remove(id) {
            registration.handle.abort();
            info!(job_id = %id, "registration cancelled");
        }
    }

    /// Snapshot of every registered job.
    pub async fn list(&self) -> Vec<Job> {
        self.registrations
            .read()
            .await
            .values()
            .map(|r| r.job.clone())
            .collect()
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.registrations.read().await.contains_key(id)
    }

    pub async fn registration_count(&self) -> usize {
        self.registrations.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartd_store::new_id;
    use chartd_types::TaskState;
    use std::time::Duration;

    fn wiring() -> (Arc<ChartdStorage>, Arc<TaskService>, Arc<Scheduler>) {
        let storage = Arc::new(ChartdStorage::open_in_memory().unwrap());
        let tasks = Arc::new(TaskService::new(storage.clone()));
        let scheduler = Scheduler::new(storage.clone(), tasks.clone(), CommandRunner::new("sh"));
        (storage, tasks, scheduler)
    }

    fn job(expression: &str, command: &str) -> Job {
        let now = Utc::now();
        Job {
            id: new_id(),
            name: "test job".into(),
            expression: expression.into(),
            command: command.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
            last_state: None,
        }
    }

    #[test]
    fn test_parse_expression_five_field() {
        assert!(parse_expression("0 0 * * *").is_ok());
        assert!(parse_expression("*/5 * * * *").is_ok());
    }

    #[test]
    fn test_parse_expression_six_field() {
        assert!(parse_expression("0 0 0 * * *").is_ok());
    }

    #[test]
    fn test_parse_expression_invalid() {
        assert!(matches!(
            parse_expression("not a schedule"),
            Err(ServiceError::Schedule(_))
        ));
        assert!(parse_expression("99 99 * * *").is_err());
    }

    #[tokio::test]
    async fn test_schedule_replaces_prior_registration() {
        let (_, _, scheduler) = wiring();
        let job = job("0 0 * * *", "true");

        scheduler.schedule(&job).await.unwrap();
        scheduler.schedule(&job).await.unwrap();

        assert_eq!(scheduler.registration_count().await, 1);
        assert!(scheduler.is_registered(&job.id).await);

        let registered = scheduler.list().await;
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].id, job.id);
        assert_eq!(registered[0].expression, "0 0 * * *");
    }

    #[tokio::test]
    async fn test_delete_job_idempotent() {
        let (_, _, scheduler) = wiring();
        let job = job("0 0 * * *", "true");
        scheduler.schedule(&job).await.unwrap();

        scheduler.delete_job(&job.id).await;
        assert_eq!(scheduler.registration_count().await, 0);

        // Unregistered id: no-op, no panic
        scheduler.delete_job(&job.id).await;
        scheduler.delete_job("never-registered").await;
        assert_eq!(scheduler.registration_count().await, 0);
    }

    #[tokio::test]
    async fn test_schedule_invalid_expression_is_a_result() {
        let (_, _, scheduler) = wiring();
        let bad = job("once in a blue moon", "true");
        let err = scheduler.schedule(&bad).await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(scheduler.registration_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_registers_enabled_jobs_only() {
        let (storage, _, scheduler) = wiring();
        let enabled = job("0 0 * * *", "true");
        let mut disabled = job("0 0 * * *", "true");
        disabled.enabled = false;
        storage.insert_job(&enabled).await.unwrap();
        storage.insert_job(&disabled).await.unwrap();

        let registered = scheduler.start().await.unwrap();
        assert_eq!(registered, 1);
        assert!(scheduler.is_registered(&enabled.id).await);
        assert!(!scheduler.is_registered(&disabled.id).await);
    }

    #[tokio::test]
    async fn test_start_skips_unschedulable_jobs() {
        let (storage, _, scheduler) = wiring();
        let good = job("0 0 * * *", "true");
        let bad = job("garbage", "true");
        storage.insert_job(&good).await.unwrap();
        storage.insert_job(&bad).await.unwrap();

        let registered = scheduler.start().await.unwrap();
        assert_eq!(registered, 1);
        assert!(!scheduler.is_registered(&bad.id).await);
    }

    #[tokio::test]
    async fn test_run_job_creates_running_task() {
        let (storage, _, scheduler) = wiring();
        let job = job("0 0 * * *", "true");

        let task = scheduler.run_job(&job).await.unwrap();
        assert_eq!(task.state, TaskState::Running);
        assert!(task.finished_at.is_none());
        assert_eq!(task.job.id, job.id);

        let stored = storage.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
    }

    #[tokio::test]
    async fn test_run_job_failure_recorded_asynchronously() {
        let (storage, _, scheduler) = wiring();
        let job = job("0 0 * * *", "/nonexistent/chartd-test-binary");

        let task = scheduler.run_job(&job).await.unwrap();
        assert_eq!(task.state, TaskState::Running);

        // Completion arrives from the detached child, not from run_job
        let mut finished = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let current = storage.get_task(&task.id).await.unwrap().unwrap();
            if current.state.is_terminal() {
                finished = Some(current);
                break;
            }
        }
        let finished = finished.expect("task never left running state");
        assert_eq!(finished.state, TaskState::Failure);
        assert!(finished.finished_at.is_some());
        assert!(
            finished
                .error
                .as_deref()
                .unwrap()
                .contains("command exited with status")
        );
    }

    #[tokio::test]
    async fn test_clean_exit_leaves_task_running() {
        let (storage, _, scheduler) = wiring();
        let job = job("0 0 * * *", "true");

        let task = scheduler.run_job(&job).await.unwrap();
        // Give the child ample time to exit cleanly
        tokio::time::sleep(Duration::from_millis(800)).await;

        let current = storage.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(current.state, TaskState::Running);
        assert!(current.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_cron_fire_creates_task() {
        let (storage, _, scheduler) = wiring();
        // Every second
        let job = job("* * * * * *", "true");
        scheduler.schedule(&job).await.unwrap();

        let mut fired = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if !storage.list_tasks_by_job(&job.id).await.unwrap().is_empty() {
                fired = true;
                break;
            }
        }
        assert!(fired, "cron trigger never fired");
    }

    #[tokio::test]
    async fn test_cancelled_registration_stops_firing() {
        let (storage, _, scheduler) = wiring();
        let job = job("* * * * * *", "true");
        scheduler.schedule(&job).await.unwrap();
        scheduler.delete_job(&job.id).await;
        assert!(!scheduler.is_registered(&job.id).await);

        // No further firings once the registration is gone
        tokio::time::sleep(Duration::from_millis(200)).await;
        let before = storage.list_tasks_by_job(&job.id).await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let after = storage.list_tasks_by_job(&job.id).await.unwrap().len();
        assert_eq!(before, after);
    }
}
