//! chartd-store: SQLite-based persistence for job definitions and the task
//! execution log.
//!
//! Jobs are stored as columns; each task row embeds a JSON snapshot of its
//! job at fire time. Live scheduler registrations are never persisted here;
//! they are rebuilt from the job table at startup.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use chartd_types::{InvalidTaskState, Job, Task, TaskState};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Corrupt job snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Corrupt task record: {0}")]
    State(#[from] InvalidTaskState),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns true when `id` is a well-formed store identifier.
///
/// String ids must round-trip through this check before being used in a
/// query; malformed ids are a validation failure, not a lookup miss.
pub fn is_valid_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

/// Generate a fresh store identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    expression TEXT NOT NULL,
    command TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_state TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    job TEXT NOT NULL,
    state TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_job_id ON tasks(job_id);";

/// SQLite-backed storage for jobs and their task log.
pub struct ChartdStorage {
    conn: Arc<Mutex<Connection>>,
}

impl ChartdStorage {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─── Jobs ───────────────────────────────────

    /// Insert a new job definition.
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn.clone();
        let job = job.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO jobs (id, name, expression, command, enabled, created_at, updated_at, last_state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    job.id,
                    job.name,
                    job.expression,
                    job.command,
                    job.enabled as i32,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    job.last_state.map(|s| s.as_str()),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT id, name, expression, command, enabled, created_at, updated_at, last_state
                     FROM jobs WHERE id = ?1",
                    rusqlite::params![id],
                    job_from_row,
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    /// List every job, unfiltered.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, name, expression, command, enabled, created_at, updated_at, last_state
                 FROM jobs ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([], job_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Update a job in place. Returns false when no row matched.
    pub async fn update_job(&self, job: &Job) -> Result<bool> {
        let conn = self.conn.clone();
        let job = job.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE jobs SET name = ?2, expression = ?3, command = ?4, enabled = ?5,
                    updated_at = ?6, last_state = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    job.id,
                    job.name,
                    job.expression,
                    job.command,
                    job.enabled as i32,
                    job.updated_at.to_rfc3339(),
                    job.last_state.map(|s| s.as_str()),
                ],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Mirror a task's terminal state onto its owning job.
    /// Returns false when the job no longer exists.
    pub async fn set_job_last_state(&self, id: &str, state: TaskState) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE jobs SET last_state = ?2 WHERE id = ?1",
                rusqlite::params![id, state.as_str()],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Delete a job. Returns false when no row matched.
    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
            Ok(count > 0)
        })
        .await?
    }

    // ─── Task Log ───────────────────────────────────

    /// Insert a new task record.
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.clone();
        let task = task.clone();
        let snapshot = serde_json::to_string(&task.job)?;
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO tasks (id, job_id, job, state, started_at, finished_at, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    task.id,
                    task.job.id,
                    snapshot,
                    task.state.as_str(),
                    task.started_at.to_rfc3339(),
                    task.finished_at.map(|t| t.to_rfc3339()),
                    task.error,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Get a task by id.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let row: Option<TaskRow> = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let result = conn
                .query_row(
                    "SELECT id, job, state, started_at, finished_at, error
                     FROM tasks WHERE id = ?1",
                    rusqlite::params![id],
                    task_row,
                )
                .optional()?;
            Ok::<_, StoreError>(result)
        })
        .await??;
        row.map(Task::try_from).transpose()
    }

    /// Move a task to a terminal state, stamping `finished_at`.
    /// Returns the updated record, or None when no row matched.
    pub async fn finish_task(
        &self,
        id: &str,
        state: TaskState,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<Option<Task>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let row: Option<TaskRow> = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE tasks SET state = ?2, finished_at = ?3, error = COALESCE(?4, error)
                 WHERE id = ?1",
                rusqlite::params![id, state.as_str(), finished_at.to_rfc3339(), error],
            )?;
            if count == 0 {
                return Ok::<_, StoreError>(None);
            }
            let result = conn
                .query_row(
                    "SELECT id, job, state, started_at, finished_at, error
                     FROM tasks WHERE id = ?1",
                    rusqlite::params![id],
                    task_row,
                )
                .optional()?;
            Ok(result)
        })
        .await??;
        row.map(Task::try_from).transpose()
    }

    /// Count tasks still marked running. Commands that exit cleanly without
    /// reporting back leave their task running forever; the daemon surfaces
    /// this at startup as an operational signal.
    pub async fn count_running_tasks(&self) -> Result<usize> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE state = 'running'",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await?
    }

    /// List every task whose embedded job id matches, most recent first.
    pub async fn list_tasks_by_job(&self, job_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn.clone();
        let job_id = job_id.to_string();
        let rows: Vec<TaskRow> = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT id, job, state, started_at, finished_at, error
                 FROM tasks WHERE job_id = ?1 ORDER BY finished_at DESC, started_at DESC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![job_id], task_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        })
        .await??;
        rows.into_iter().map(Task::try_from).collect()
    }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        expression: row.get(2)?,
        command: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
        created_at: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        updated_at: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        last_state: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| s.parse().ok()),
    })
}

/// Raw task row; the job snapshot and state still need decoding.
struct TaskRow {
    id: String,
    job: String,
    state: String,
    started_at: String,
    finished_at: Option<String>,
    error: Option<String>,
}

fn task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        job: row.get(1)?,
        state: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        error: row.get(5)?,
    })
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            job: serde_json::from_str(&row.job)?,
            state: row.state.parse()?,
            started_at: row.started_at.parse().unwrap_or_else(|_| Utc::now()),
            finished_at: row.finished_at.and_then(|s| s.parse().ok()),
            error: row.error,
        })
    }
}
