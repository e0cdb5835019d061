//! Child-process execution of job commands.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::tasks::TaskService;

/// Launches job commands as detached child processes and reports failures
/// back into the task log.
#[derive(Clone)]
pub struct CommandRunner {
    shell: String,
}

impl CommandRunner {
    /// Create a runner that launches commands through the given shell.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Spawn `command` with the task id appended as its final argument, so
    /// the external program can report back or be correlated in logs.
    ///
    /// Fire-and-forget: the scheduler never blocks on the child. Completion
    /// is delivered asynchronously — a launch failure or non-zero exit marks
    /// the task failed with the error message; a clean exit leaves the task
    /// running until something explicitly completes it. No implicit success.
    pub fn spawn(&self, command: String, task_id: String, tasks: Arc<TaskService>) {
        let shell = self.shell.clone();
        tokio::spawn(async move {
            let line = format!("{command} {task_id}");
            debug!(%task_id, "launching: {line}");

            let result = Command::new(&shell)
                .arg("-c")
                .arg(&line)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await;

            let failure = match result {
                Ok(output) if output.status.success() => {
                    debug!(%task_id, "command exited cleanly, awaiting explicit completion");
                    None
                }
                Ok(output) => {
                    let code = output.status.code().unwrap_or(-1);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Some(format!(
                        "command exited with status {code}: {}",
                        stderr.trim()
                    ))
                }
                Err(e) => Some(format!("failed to launch command: {e}")),
            };

            if let Some(message) = failure {
                warn!(%task_id, "{message}");
                if let Err(e) = tasks.update_one(&task_id, "failure", Some(message)).await {
                    warn!(%task_id, "failed to record task failure: {e}");
                }
            }
        });
    }
}
