// ABOUTME: Runner configuration loaded from a TOML file
// ABOUTME: Command-line flags override file values before validation

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::scheduler::runner::{RunnerConfig, StopPolicy, DEFAULT_MAX_RUNNING_JOBS};

pub const DEFAULT_COMMAND: &str = "generateAdCopy";
pub const DEFAULT_BATCH_SIZE: u32 = 20;
/// Per-invocation ceiling enforced by the spreadsheet host.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 360;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub command: String,
    pub batch_size: u32,
    pub max_running_jobs: usize,
    pub request_timeout_secs: u64,
    pub tracing: bool,
    pub stop_policy: StopPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            command: DEFAULT_COMMAND.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_running_jobs: DEFAULT_MAX_RUNNING_JOBS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tracing: false,
            stop_policy: StopPolicy::Drain,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML")
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url is not set. Add it to the config file or pass --api-url");
        }
        if self.command.trim().is_empty() {
            bail!("command must not be empty");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.max_running_jobs == 0 {
            bail!("max_running_jobs must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_running_jobs: self.max_running_jobs,
            tracing: self.tracing,
            stop_policy: self.stop_policy,
        }
    }
}
