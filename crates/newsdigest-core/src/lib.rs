//! # NewsDigest Core
//!
//! Error taxonomy, configuration and schedule primitives shared by the
//! scheduler, the pipeline steps and the daemon binary.

pub mod config;
pub mod error;
pub mod schedule;
pub mod time;

pub use config::{ApiConfig, DigestConfig, LicenseConfig, PipelineConfig, SchedulerConfig, TaskEntry};
pub use error::{DigestError, Result};
pub use schedule::{MIN_INTERVAL_MINUTES, TaskSchedule};
