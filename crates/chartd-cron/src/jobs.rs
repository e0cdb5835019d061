//! Job service: validated lifecycle operations that keep the job store and
//! the live scheduler consistent.
//!
//! Per-job-id operations are not serialized by the scheduler itself; callers
//! issuing concurrent mutations of the same id get last-writer-wins on the
//! stored record.

use std::sync::Arc;

use chrono::Utc;

use chartd_store::{ChartdStorage, is_valid_id, new_id};
use chartd_types::{Job, JobDraft, JobPatch, Task};

use crate::error::{Result, ServiceError, Violation};
use crate::scheduler::{Scheduler, parse_expression};

/// Orchestrates the job store and the scheduler so the two never diverge.
pub struct JobService {
    storage: Arc<ChartdStorage>,
    scheduler: Arc<Scheduler>,
}

impl JobService {
    pub fn new(storage: Arc<ChartdStorage>, scheduler: Arc<Scheduler>) -> Self {
        Self { storage, scheduler }
    }

    /// Create a job from a draft.
    ///
    /// Every missing required field is reported together in one validation
    /// failure. `enabled` defaults to true. The job is scheduled before it
    /// is persisted, so an unregistrable cron expression never leaves a
    /// stored record behind; conversely, a persistence failure takes the
    /// fresh registration back down.
    pub async fn create(&self, draft: JobDraft) -> Result<Job> {
        let mut violations = Vec::new();
        let name = required(&draft.name, "name", &mut violations);
        let expression = required(&draft.expression, "expression", &mut violations);
        let command = required(&draft.command, "command", &mut violations);
        if !violations.is_empty() {
            return Err(ServiceError::Validation(violations));
        }

        let now = Utc::now();
        let job = Job {
            id: new_id(),
            name: name.unwrap_or_default(),
            expression: expression.unwrap_or_default(),
            command: command.unwrap_or_default(),
            enabled: draft.enabled.unwrap_or(true),
            created_at: now,
            updated_at: now,
            last_state: None,
        };

        // Schedule before persisting. Disabled jobs get a parse-only check
        // so a bad expression is still rejected without a registration.
        if job.enabled {
            self.scheduler.schedule(&job).await?;
        } else {
            parse_expression(&job.expression)?;
        }

        if let Err(e) = self.storage.insert_job(&job).await {
            self.scheduler.delete_job(&job.id).await;
            return Err(e.into());
        }
        Ok(job)
    }

    /// Get a job by id. Malformed ids are a validation failure, looked-up
    /// misses are not-found.
    pub async fn get_one(&self, id: &str) -> Result<Job> {
        if !is_valid_id(id) {
            return Err(ServiceError::invalid_id("job"));
        }
        self.storage
            .get_job(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "job",
                id: id.to_string(),
            })
    }

    /// Every persisted job, with no implicit enabled-only filter.
    pub async fn all(&self) -> Result<Vec<Job>> {
        Ok(self.storage.list_jobs().await?)
    }

    /// Delete a job: the live registration is cancelled before the record,
    /// so a trigger can never outlive its job. Not-found when no record
    /// existed; the cancellation stands either way.
    pub async fn delete_one(&self, id: &str) -> Result<()> {
        if !is_valid_id(id) {
            return Err(ServiceError::invalid_id("job"));
        }
        self.scheduler.delete_job(id).await;
        if !self.storage.delete_job(id).await? {
            return Err(ServiceError::NotFound {
                resource: "job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Apply a partial update, re-registering or cancelling the live trigger
    /// to match the new state, and stamp `updatedAt`.
    ///
    /// If the write does not land (row gone, or storage failing), the
    /// just-replaced registration is taken back down before the error
    /// surfaces, so a live trigger never follows an unpersisted patch.
    pub async fn update(&self, id: &str, patch: JobPatch) -> Result<Job> {
        let mut job = self.get_one(id).await?;
        let expression_changed = patch.expression.is_some();

        if let Some(name) = patch.name {
            job.name = name;
        }
        if let Some(expression) = patch.expression {
            job.expression = expression;
        }
        if let Some(command) = patch.command {
            job.command = command;
        }
        if let Some(enabled) = patch.enabled {
            job.enabled = enabled;
        }
        job.updated_at = Utc::now();

        if job.enabled {
            self.scheduler.schedule(&job).await?;
        } else {
            if expression_changed {
                parse_expression(&job.expression)?;
            }
            self.scheduler.delete_job(&job.id).await;
        }

        match self.storage.update_job(&job).await {
            Ok(true) => Ok(job),
            Ok(false) => {
                // Deleted underneath us between the lookup and the write
                self.scheduler.delete_job(&job.id).await;
                Err(ServiceError::NotFound {
                    resource: "job",
                    id: id.to_string(),
                })
            }
            Err(e) => {
                self.scheduler.delete_job(&job.id).await;
                Err(e.into())
            }
        }
    }

    /// Flip the enabled flag, keeping the live registration in step.
    pub async fn enable(&self, id: &str, enabled: bool) -> Result<Job> {
        self.update(
            id,
            JobPatch {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    /// Run a job immediately, independent of its cron trigger.
    pub async fn run_now(&self, id: &str) -> Result<Task> {
        let job = self.get_one(id).await?;
        self.scheduler.run_job(&job).await
    }
}

fn required(
    value: &Option<String>,
    field: &'static str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            violations.push(Violation::missing_field("job", field));
            None
        }
    }
}
