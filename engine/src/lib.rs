//! Run orchestration for tally.
//!
//! [`RunConfig`] resolves the config file and command-line overrides into the
//! settings for one run; [`Orchestrator`] executes it and yields a
//! [`RunReport`].

mod config;
mod orchestrator;
mod report;

pub use config::{
    ApiConfig, ConfigError, Overrides, ReportConfig, RetryConfig, RunConfig, TallyConfig,
    WorkersConfig, config_path,
};
pub use orchestrator::{Orchestrator, RunError, RunPhase, RunState, WorkerStats};
pub use report::{Completeness, RunReport};
