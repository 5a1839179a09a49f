//! Error types shared by every NewsDigest crate.

use chrono::NaiveDateTime;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, DigestError>;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task configuration: {0}")]
    TaskConfiguration(String),

    #[error("License expired at {0}")]
    LicenseExpired(NaiveDateTime),

    #[error("Task is already running: {0}")]
    AlreadyRunning(String),

    #[error("Pipeline execution failed for {task}: {message}")]
    TaskExecution { task: String, message: String },

    #[error("Task validation failed: {step}")]
    StepValidation { step: String },

    #[error("Step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    ApiResponse { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DigestError {
    /// Errors caused by the service or task being in the wrong state for the
    /// requested operation.
    pub fn is_service_state(&self) -> bool {
        matches!(self, Self::LicenseExpired(_) | Self::AlreadyRunning(_))
    }

    /// True when a pipeline step refused to run because its precondition
    /// did not hold, as opposed to crashing while running.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::StepValidation { .. })
    }

    pub fn task_execution(task: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::TaskExecution {
            task: task.into(),
            message: cause.to_string(),
        }
    }

    pub fn step(step: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Step {
            step: step.into(),
            message: cause.to_string(),
        }
    }
}
