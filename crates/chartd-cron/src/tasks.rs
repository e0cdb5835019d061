//! Task service: records execution attempts and finalizes their state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use chartd_store::{ChartdStorage, is_valid_id, new_id};
use chartd_types::{Job, Task, TaskState};

use crate::error::{Result, ServiceError, Violation};

/// Creates task records when a job fires, moves them to a terminal state on
/// completion, and mirrors the terminal state back onto the owning job.
pub struct TaskService {
    storage: Arc<ChartdStorage>,
}

impl TaskService {
    pub fn new(storage: Arc<ChartdStorage>) -> Self {
        Self { storage }
    }

    /// Record a new execution attempt for `job`, in the running state.
    ///
    /// The job is embedded as a full snapshot, not a live reference, so the
    /// task log stays meaningful after the job is edited or deleted.
    pub async fn create(&self, job: &Job) -> Result<Task> {
        if job.id.trim().is_empty() {
            return Err(ServiceError::Validation(vec![Violation::missing_field(
                "task", "job",
            )]));
        }

        let task = Task {
            id: new_id(),
            job: job.clone(),
            state: TaskState::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        self.storage.insert_task(&task).await?;
        Ok(task)
    }

    /// Move a task to a terminal state.
    ///
    /// Only `"success"` and `"failure"` are accepted; anything else is a
    /// validation failure that leaves the task untouched. The new state is
    /// propagated to the owning job's `lastState`; if the job has since been
    /// deleted the task update stands anyway — the task log is the
    /// authoritative execution record.
    pub async fn update_one(
        &self,
        id: &str,
        state: &str,
        error: Option<String>,
    ) -> Result<Task> {
        if !is_valid_id(id) {
            return Err(ServiceError::invalid_id("task"));
        }
        let requested = match state.parse::<TaskState>() {
            Ok(s) if s.is_terminal() => s,
            _ => {
                return Err(ServiceError::Validation(vec![Violation::invalid(
                    "task", "state",
                )]));
            }
        };

        let current = self
            .storage
            .get_task(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "task",
                id: id.to_string(),
            })?;

        // Terminal states absorb repeated writes without restamping finishedAt.
        if current.state.is_terminal() {
            debug!(task_id = %id, state = %current.state, "task already finished, ignoring update");
            return Ok(current);
        }

        let finished = self
            .storage
            .finish_task(id, requested, Utc::now(), error)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "task",
                id: id.to_string(),
            })?;

        match self
            .storage
            .set_job_last_state(&finished.job.id, requested)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id = %finished.job.id, "owning job gone, last state not propagated")
            }
            Err(e) => warn!(job_id = %finished.job.id, "failed to propagate last state: {e}"),
        }

        Ok(finished)
    }

    /// All tasks whose embedded job id matches, most recently finished first.
    pub async fn get_all_by_job_id(&self, job_id: &str) -> Result<Vec<Task>> {
        if !is_valid_id(job_id) {
            return Err(ServiceError::invalid_id("task"));
        }
        let tasks = self.storage.list_tasks_by_job(job_id).await?;
        if tasks.is_empty() {
            return Err(ServiceError::NotFound {
                resource: "task",
                id: job_id.to_string(),
            });
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service() -> (Arc<ChartdStorage>, TaskService) {
        let storage = Arc::new(ChartdStorage::open_in_memory().unwrap());
        (storage.clone(), TaskService::new(storage))
    }

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: new_id(),
            name: "Extract data".into(),
            expression: "0 0 * * *".into(),
            command: "/bin/extract".into(),
            enabled: true,
            created_at: now,
            updated_at: now,
            last_state: None,
        }
    }

    #[tokio::test]
    async fn test_create_running_task() {
        let (_, service) = service();
        let job = job();

        let task = service.create(&job).await.unwrap();
        assert_eq!(task.state, TaskState::Running);
        assert!(task.finished_at.is_none());
        assert!(task.error.is_none());
        assert_eq!(task.job.command, "/bin/extract");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_job() {
        let (_, service) = service();
        let mut bad = job();
        bad.id = "".into();

        let err = service.create(&bad).await.unwrap_err();
        let ServiceError::Validation(violations) = err else {
            panic!("expected validation error");
        };
        assert_eq!(violations, vec![Violation::missing_field("task", "job")]);
    }

    #[tokio::test]
    async fn test_update_success_stamps_finished_at_and_propagates() {
        let (storage, service) = service();
        let job = job();
        storage.insert_job(&job).await.unwrap();
        let task = service.create(&job).await.unwrap();

        let before = Utc::now();
        let finished = service.update_one(&task.id, "success", None).await.unwrap();
        assert_eq!(finished.state, TaskState::Success);

        let finished_at = finished.finished_at.unwrap();
        let delta = (finished_at - before).num_milliseconds().abs();
        assert!(delta <= 1000, "finishedAt off by {delta}ms");

        let owner = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(owner.last_state, Some(TaskState::Success));
    }

    #[tokio::test]
    async fn test_update_rejects_unsupported_state() {
        let (storage, service) = service();
        let job = job();
        let task = service.create(&job).await.unwrap();

        for bad in ["paused", "running", "done", ""] {
            let err = service.update_one(&task.id, bad, None).await.unwrap_err();
            let ServiceError::Validation(violations) = err else {
                panic!("expected validation error for {bad:?}");
            };
            assert_eq!(violations, vec![Violation::invalid("task", "state")]);
        }

        // Prior state and finishedAt untouched
        let current = storage.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(current.state, TaskState::Running);
        assert!(current.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_update_invalid_id() {
        let (_, service) = service();
        let err = service.update_one("bogus", "success", None).await.unwrap_err();
        assert_eq!(err.status(), 422);
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let (_, service) = service();
        let err = service
            .update_one(&new_id(), "success", None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_repeated_terminal_write_is_noop() {
        let (storage, service) = service();
        let job = job();
        storage.insert_job(&job).await.unwrap();
        let task = service.create(&job).await.unwrap();

        let first = service.update_one(&task.id, "success", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = service.update_one(&task.id, "success", None).await.unwrap();

        // finishedAt not restamped
        assert_eq!(first.finished_at, second.finished_at);

        // A different terminal state does not overwrite either
        let third = service.update_one(&task.id, "failure", None).await.unwrap();
        assert_eq!(third.state, TaskState::Success);
    }

    #[tokio::test]
    async fn test_update_survives_deleted_job() {
        let (storage, service) = service();
        let job = job();
        // Job never persisted: propagation has nothing to update
        let task = service.create(&job).await.unwrap();

        let finished = service.update_one(&task.id, "failure", None).await.unwrap();
        assert_eq!(finished.state, TaskState::Failure);
        assert!(storage.get_job(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_by_job_id() {
        let (_, service) = service();
        let job = job();
        for _ in 0..3 {
            service.create(&job).await.unwrap();
        }

        let tasks = service.get_all_by_job_id(&job.id).await.unwrap();
        assert_eq!(tasks.len(), 3);

        // Empty result set is not-found, not an empty list
        let err = service.get_all_by_job_id(&new_id()).await.unwrap_err();
        assert_eq!(err.status(), 404);

        let err = service.get_all_by_job_id("bogus").await.unwrap_err();
        assert_eq!(err.status(), 422);
    }
}
