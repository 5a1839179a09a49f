//! Daily window + interval schedule attached to every task.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

/// Smallest accepted spacing between two runs of the same task (one second).
pub const MIN_INTERVAL_MINUTES: f64 = 1.0 / 60.0;

/// When a task may run: inside `[daily_start_time, daily_end_time]`, at
/// most once per `interval_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    #[serde(with = "crate::time::hhmm", default = "default_start")]
    pub daily_start_time: NaiveTime,
    #[serde(with = "crate::time::hhmm", default = "default_end")]
    pub daily_end_time: NaiveTime,
    #[serde(default = "default_interval")]
    pub interval_minutes: f64,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn default_start() -> NaiveTime { NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN) }
fn default_end() -> NaiveTime { NaiveTime::from_hms_opt(17, 30, 0).unwrap_or(NaiveTime::MIN) }
fn default_interval() -> f64 { 60.0 }
fn bool_true() -> bool { true }

impl Default for TaskSchedule {
    fn default() -> Self {
        Self {
            daily_start_time: default_start(),
            daily_end_time: default_end(),
            interval_minutes: default_interval(),
            enabled: true,
        }
    }
}

impl TaskSchedule {
    /// A window covering the whole day (`00:00`-`23:59`).
    pub fn all_day(interval_minutes: f64) -> Self {
        Self {
            daily_start_time: NaiveTime::MIN,
            daily_end_time: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            interval_minutes,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_start_time > self.daily_end_time {
            return Err(DigestError::TaskConfiguration(format!(
                "daily_start_time {} is after daily_end_time {}",
                crate::time::format_hhmm(&self.daily_start_time),
                crate::time::format_hhmm(&self.daily_end_time)
            )));
        }
        if !self.interval_minutes.is_finite() || self.interval_minutes < MIN_INTERVAL_MINUTES {
            return Err(DigestError::TaskConfiguration(format!(
                "interval_minutes must be at least {MIN_INTERVAL_MINUTES:.4}, got {}",
                self.interval_minutes
            )));
        }
        Ok(())
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time_of_day: NaiveTime) -> bool {
        self.daily_start_time <= time_of_day && time_of_day <= self.daily_end_time
    }
}
