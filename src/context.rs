//! Per-invocation run context

use chrono::{DateTime, Utc};

use crate::config::Config;

/// Configuration plus the run time, built once per invocation
///
/// Every component reads the run time from here so that one run produces one
/// consistent timestamp.
#[derive(Clone, Debug)]
pub struct RunContext {
    config: Config,
    run_time: DateTime<Utc>,
}

impl RunContext {
    /// Context starting now
    pub fn new(config: Config) -> Self {
        Self::at(config, Utc::now())
    }

    /// Context with a fixed run time
    pub fn at(config: Config, run_time: DateTime<Utc>) -> Self {
        Self { config, run_time }
    }

    /// Loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Instant the run started
    pub fn run_time(&self) -> DateTime<Utc> {
        self.run_time
    }
}
