//! Long-running pipeline tasks and the launcher that supervises them.

mod accumulate;
mod cancel;
mod launcher;


pub use accumulate::{AccumulationTask, FlushTrigger, StepOutput};
pub use cancel::CancellationToken;
pub use launcher::TaskLauncher;

use crate::errors::Result;
use async_trait::async_trait;

/// A unit of work owned by one step partition.
#[async_trait]
pub trait Task: Send {
    /// The owning step's name.
    fn name(&self) -> &str;

    /// The partition the task serves.
    fn partition(&self) -> usize;

    /// Runs the task to completion.
    async fn execute(self: Box<Self>) -> Result<()>;
}

/// A type-erased task.
pub type BoxedTask = Box<dyn Task>;
