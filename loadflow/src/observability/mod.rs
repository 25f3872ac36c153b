//! Logging setup and pipeline metrics.

mod logging;
mod metrics;

pub use logging::{env_filter, init_logging, LogConfig, LogFormat, LogLevel, LogOutput, LOG_ENV_VAR};
pub use metrics::{PipelineMetrics, StepMetrics};
