//! An ordered composition of steps connected by queues.

use super::LoadPipelineStep;
use crate::errors::Result;
use crate::queue::CloseableQueue;
use crate::task::{BoxedTask, TaskLauncher};
use std::sync::Arc;
use tracing::info;

/// Ordered steps plus the queues between them.
pub struct LoadPipeline {
    steps: Vec<Box<dyn LoadPipelineStep>>,
    queues: Vec<Arc<dyn CloseableQueue>>,
}

impl LoadPipeline {
    /// Composes `steps` in order. `queues` are the queues the pipeline owns
    /// between steps; they are closed by [`stop`](Self::stop).
    #[must_use]
    pub fn new(steps: Vec<Box<dyn LoadPipelineStep>>, queues: Vec<Arc<dyn CloseableQueue>>) -> Self {
        Self { steps, queues }
    }

    /// The steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[Box<dyn LoadPipelineStep>] {
        &self.steps
    }

    /// The last step, whose updates mark records durable.
    #[must_use]
    pub fn final_step(&self) -> Option<&dyn LoadPipelineStep> {
        self.steps.last().map(AsRef::as_ref)
    }

    /// Launches every worker of every step, in declared order.
    ///
    /// Workers are all created before any is launched, so a queue between
    /// steps cannot close before its last producer exists. When the
    /// launcher is cancelled, the pipeline's queues are closed.
    pub fn start(&self, launcher: &mut TaskLauncher) -> Result<()> {
        let mut tasks: Vec<BoxedTask> = Vec::new();
        for step in &self.steps {
            info!(step = step.name(), workers = step.num_workers(), "Starting step");
            for partition in 0..step.num_workers() {
                tasks.push(step.task_for_partition(partition)?);
            }
        }

        for queue in &self.queues {
            let queue = Arc::clone(queue);
            launcher.cancel_token().on_cancel(move || queue.close());
        }
        for task in tasks {
            launcher.launch(task);
        }
        Ok(())
    }

    /// Closes the queues between steps. Downstream workers drain and exit.
    pub fn stop(&self) {
        for queue in &self.queues {
            info!(queue = queue.name(), "Closing queue");
            queue.close();
        }
    }

    /// Starts the pipeline on a fresh launcher and waits for it to finish.
    pub async fn run(&self) -> Result<()> {
        let mut launcher = TaskLauncher::new();
        self.start(&mut launcher)?;
        launcher.join().await
    }
}

impl std::fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<(&str, usize)> = self
            .steps
            .iter()
            .map(|step| (step.name(), step.num_workers()))
            .collect();
        f.debug_struct("LoadPipeline")
            .field("steps", &steps)
            .field("queues", &self.queues.len())
            .finish()
    }
}
