//! Supervises pipeline tasks as one structured group.

use super::{BoxedTask, CancellationToken};
use crate::errors::{LoadflowError, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Spawns named tasks and joins them as a group.
///
/// If any task fails, the cancellation token is tripped and the remaining
/// tasks are aborted. [`join`](Self::join) returns the first error.
pub struct TaskLauncher {
    tasks: JoinSet<(String, Result<()>)>,
    cancel_token: Arc<CancellationToken>,
}

impl TaskLauncher {
    /// Creates an empty launcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel_token: Arc::new(CancellationToken::new()),
        }
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Spawns `task` on the current runtime.
    pub fn launch(&mut self, task: BoxedTask) {
        let name = format!("{}[{}]", task.name(), task.partition());
        debug!(task = %name, "Launching task");
        self.tasks.spawn(async move {
            let result = task.execute().await;
            (name, result)
        });
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every task, stopping the group at the first failure.
    pub async fn join(mut self) -> Result<()> {
        let mut first_error: Option<LoadflowError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let failure = match joined {
                Ok((name, Ok(()))) => {
                    debug!(task = %name, "Task finished");
                    continue;
                }
                Ok((name, Err(e))) => {
                    error!(task = %name, kind = e.kind(), error = %e, "Task failed");
                    e
                }
                Err(join_error) if join_error.is_cancelled() && first_error.is_some() => continue,
                Err(join_error) => {
                    error!(error = %join_error, "Task aborted");
                    LoadflowError::TaskAborted(join_error.to_string())
                }
            };

            if first_error.is_none() {
                self.cancel_token.cancel(failure.to_string());
                self.tasks.abort_all();
                first_error = Some(failure);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All tasks finished");
                Ok(())
            }
        }
    }
}

impl Default for TaskLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLauncher")
            .field("task_count", &self.task_count())
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish()
    }
}
