//! chartd-types: Shared domain types for the chartd job scheduler.
//!
//! The serde field names (`createdAt`, `lastState`, `startedAt`, ...) are the
//! stable contract other layers depend on; do not rename them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Task State ────────────────────

/// Lifecycle state of a task (one execution attempt of a job).
///
/// Transitions are one-directional: `Running -> Success` or
/// `Running -> Failure`. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Success,
    Failure,
}

impl TaskState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failure => "failure",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognised task state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task state: {0}")]
pub struct InvalidTaskState(pub String);

impl std::str::FromStr for TaskState {
    type Err = InvalidTaskState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TaskState::Running),
            "success" => Ok(TaskState::Success),
            "failure" => Ok(TaskState::Failure),
            other => Err(InvalidTaskState(other.to_string())),
        }
    }
}

// ──────────────────── Job ────────────────────

/// A persisted job definition: a cron schedule plus a shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Store-native unique id, assigned at creation, immutable.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Cron schedule expression (e.g. "0 0 * * *" for daily at midnight).
    pub expression: String,
    /// Shell command launched when the job fires.
    pub command: String,
    /// Whether the job has a live scheduler registration.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Terminal state of the most recent task, mirrored by the task service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<TaskState>,
}

/// Payload for creating a job. Field presence is checked by the job service,
/// which reports every missing field at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Defaults to true when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Partial update for an existing job. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

fn default_true() -> bool {
    true
}

// ──────────────────── Task ────────────────────

/// One execution attempt of a job, recorded in the task log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-native unique id.
    pub id: String,
    /// Snapshot of the job definition at fire time, not a live reference.
    pub job: Job,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    /// Null exactly while `state` is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message recorded when the command fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
