//! Pipeline steps, their composition, and the builder for the provided shapes.

mod builder;
mod load_pipeline;
mod step;

#[cfg(test)]
mod integration_tests;

pub use builder::{BuiltPipeline, LoadPipelineBuilder, STEP_ACCUMULATE, STEP_DIRECT_LOAD, STEP_LOAD};
pub use load_pipeline::LoadPipeline;
pub use step::{AccumulateStep, LoadPipelineStep};
