//! Test doubles and fixtures for loadflow pipelines.
//!
//! This module provides:
//! - Destination sinks that record, fail, or fail transiently
//! - A recording direct-loader factory
//! - Record and catalog fixtures

mod fixtures;
mod loaders;
mod sinks;

pub use fixtures::{dedupe_stream, record, record_with_size, records, stream, TestCatalog};
pub use loaders::{RecordingLoader, RecordingLoaderFactory};
pub use sinks::{FailingSink, FlakySink, LoadCall, RecordingSink};
