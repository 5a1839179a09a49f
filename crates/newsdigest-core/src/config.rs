//! NewsDigest configuration system.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DigestError, Result};
use crate::schedule::TaskSchedule;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Scheduled tasks. Empty means the built-in task catalogue is used.
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

impl DigestConfig {
    /// Load config from the default path (~/.newsdigest/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::info!("📄 No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DigestError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DigestError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        tracing::debug!("Loaded config from {} ({} tasks)", path.display(), config.tasks.len());
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DigestError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the NewsDigest home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".newsdigest")
    }

    /// Reject values the scheduler cannot operate with.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        if let (Some(start), Some(end)) = (self.license.start_datetime, self.license.end_datetime)
            && start > end
        {
            return Err(DigestError::Config(format!(
                "license start {start} is after license end {end}"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.tasks {
            if !seen.insert(entry.id.as_str()) {
                return Err(DigestError::Config(format!("duplicate task id '{}'", entry.id)));
            }
            entry.schedule.validate()?;
        }
        Ok(())
    }
}

/// Worker pool and scheduling loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of queue consumers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Permits shared by all workers; caps simultaneous executions.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Scan interval used while no task is registered.
    #[serde(default = "default_scan_interval")]
    pub default_scan_interval_minutes: f64,
    /// Pause after an unexpected error in the scheduling loop.
    #[serde(default = "default_loop_backoff")]
    pub loop_backoff_secs: u64,
}

fn default_worker_count() -> usize { 3 }
fn default_max_concurrent_tasks() -> usize { 5 }
fn default_queue_capacity() -> usize { 1000 }
fn default_scan_interval() -> f64 { 60.0 }
fn default_loop_backoff() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            queue_capacity: default_queue_capacity(),
            default_scan_interval_minutes: default_scan_interval(),
            loop_backoff_secs: default_loop_backoff(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(DigestError::Config("scheduler.worker_count must be > 0".into()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(DigestError::Config("scheduler.max_concurrent_tasks must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(DigestError::Config("scheduler.queue_capacity must be > 0".into()));
        }
        if !self.default_scan_interval_minutes.is_finite()
            || self.default_scan_interval_minutes < crate::schedule::MIN_INTERVAL_MINUTES
        {
            return Err(DigestError::Config(format!(
                "scheduler.default_scan_interval_minutes is too small: {}",
                self.default_scan_interval_minutes
            )));
        }
        Ok(())
    }
}

/// Validity window the service runs under. Values are local wall-clock
/// datetimes written as quoted strings, e.g. `"2026-12-31T23:59:59"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseConfig {
    #[serde(default)]
    pub start_datetime: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_datetime: Option<NaiveDateTime>,
}

/// Content backend the pipeline steps call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_min")]
    pub retry_min_secs: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,
    #[serde(default = "default_fetch_path")]
    pub fetch_path: String,
    #[serde(default = "default_process_path")]
    pub process_path: String,
    #[serde(default = "default_summary_path")]
    pub summary_path: String,
}

fn default_base_url() -> String { "http://localhost:8000".into() }
fn default_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_min() -> u64 { 4 }
fn default_retry_max() -> u64 { 10 }
fn default_fetch_path() -> String { "/api/v1/scrapers/scrapers/cnyes/fetch-articles".into() }
fn default_process_path() -> String { "/api/v1/articles/process-pending".into() }
fn default_summary_path() -> String { "/api/v1/articles/latest-summaries".into() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_min_secs: default_retry_min(),
            retry_max_secs: default_retry_max(),
            fetch_path: default_fetch_path(),
            process_path: default_process_path(),
            summary_path: default_summary_path(),
        }
    }
}

/// Defaults for pipeline step arguments missing from a task's context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_summary_limit")]
    pub summary_limit: u32,
}

fn default_batch_size() -> u32 { 150 }
fn default_summary_limit() -> u32 { 30 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            summary_limit: default_summary_limit(),
        }
    }
}

/// One `[[tasks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub schedule: TaskSchedule,
    /// Pipeline arguments, e.g. `source_type`, `source`, `limit`.
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl TaskEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
