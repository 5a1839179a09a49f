//! Task definitions: the lifecycle every schedulable unit of work shares.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use newsdigest_core::error::{DigestError, Result};
use newsdigest_core::schedule::TaskSchedule;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::context::PipelineContext;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Read-only view returned by [`ScheduledTask::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusSnapshot {
    pub status: TaskStatus,
    pub last_run: Option<NaiveDateTime>,
    pub error: Option<String>,
}

/// Everything an operator sees about one registered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub last_run: Option<NaiveDateTime>,
    pub error: Option<String>,
    pub enabled: bool,
    pub schedule: TaskSchedule,
}

/// Outcome of one eligibility check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eligibility {
    Ready,
    Disabled,
    AlreadyRunning,
    OutsideWindow,
    IntervalNotReached { elapsed_minutes: f64 },
}

impl Eligibility {
    pub fn is_ready(&self) -> bool {
        matches!(self, Eligibility::Ready)
    }
}

struct Lifecycle {
    schedule: TaskSchedule,
    status: TaskStatus,
    last_run: Option<NaiveDateTime>,
    error: Option<String>,
}

/// Lifecycle cell embedded in every task. All transitions happen under one
/// lock so the `running` check and the switch to `running` are atomic.
pub struct TaskState {
    name: String,
    clock: Arc<dyn Clock>,
    inner: RwLock<Lifecycle>,
}

impl TaskState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock: Arc::new(SystemClock),
            inner: RwLock::new(Lifecycle {
                schedule: TaskSchedule::default(),
                status: TaskStatus::Idle,
                last_run: None,
                error: None,
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schedule(self, schedule: TaskSchedule) -> Result<Self> {
        self.set_schedule(schedule)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> TaskSchedule {
        self.inner.read().schedule.clone()
    }

    /// Replace the schedule in place. Invalid schedules leave the old one untouched.
    pub fn set_schedule(&self, schedule: TaskSchedule) -> Result<()> {
        schedule.validate()?;
        self.inner.write().schedule = schedule;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.read().schedule.enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.write().schedule.enabled = enabled;
    }

    /// Flip `enabled`, returning the new value.
    pub fn toggle_enabled(&self) -> bool {
        let mut inner = self.inner.write();
        inner.schedule.enabled = !inner.schedule.enabled;
        inner.schedule.enabled
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.read().status
    }

    pub fn last_run(&self) -> Option<NaiveDateTime> {
        self.inner.read().last_run
    }

    pub fn snapshot(&self) -> TaskStatusSnapshot {
        let inner = self.inner.read();
        TaskStatusSnapshot {
            status: inner.status,
            last_run: inner.last_run,
            error: inner.error.clone(),
        }
    }

    /// Enter `running`. Fails without touching the state if a run is already in flight.
    pub fn begin(&self) -> Result<RunGuard<'_>> {
        let mut inner = self.inner.write();
        if inner.status == TaskStatus::Running {
            return Err(DigestError::AlreadyRunning(self.name.clone()));
        }
        inner.status = TaskStatus::Running;
        inner.error = None;
        inner.last_run = Some(self.clock.now());
        Ok(RunGuard {
            state: self,
            finished: false,
        })
    }

    /// Evaluate whether the task may be enqueued at `now`.
    ///
    /// A `completed` task that passes every check goes back to `idle` here,
    /// not when its previous run ended.
    pub fn check_eligibility(&self, now: NaiveDateTime) -> Eligibility {
        let mut inner = self.inner.write();
        if !inner.schedule.enabled {
            return Eligibility::Disabled;
        }
        if inner.status == TaskStatus::Running {
            return Eligibility::AlreadyRunning;
        }
        if !inner.schedule.contains(now.time()) {
            return Eligibility::OutsideWindow;
        }
        if let Some(last_run) = inner.last_run {
            let elapsed_minutes = (now - last_run).num_milliseconds() as f64 / 60_000.0;
            if elapsed_minutes < inner.schedule.interval_minutes {
                return Eligibility::IntervalNotReached { elapsed_minutes };
            }
        }
        if inner.status == TaskStatus::Completed {
            inner.status = TaskStatus::Idle;
        }
        Eligibility::Ready
    }

    fn finish(&self, status: TaskStatus, error: Option<String>) {
        let mut inner = self.inner.write();
        inner.status = status;
        inner.error = error;
    }
}

/// Held for the duration of one run. Dropping it without calling
/// [`complete`](Self::complete) or [`fail`](Self::fail) marks the task failed.
pub struct RunGuard<'a> {
    state: &'a TaskState,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn complete(mut self) {
        self.finished = true;
        self.state.finish(TaskStatus::Completed, None);
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.finished = true;
        self.state.finish(TaskStatus::Failed, Some(error.into()));
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("⚠️ Task '{}' exited without finishing; marking failed", self.state.name);
            self.state
                .finish(TaskStatus::Failed, Some("execution aborted before completion".into()));
        }
    }
}

/// A schedulable unit of work.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn state(&self) -> &TaskState;

    fn name(&self) -> &str {
        self.state().name()
    }

    /// Run to completion. Returns `AlreadyRunning` if another run holds the task.
    async fn execute(&self) -> Result<()>;

    fn get_status(&self) -> TaskStatusSnapshot {
        self.state().snapshot()
    }

    /// Pipeline arguments bound at the start of each run, if the task takes any.
    fn context(&self) -> Option<PipelineContext> {
        None
    }

    fn set_context(&self, _context: PipelineContext) -> Result<()> {
        Err(DigestError::TaskConfiguration(format!(
            "task '{}' does not take a pipeline context",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn state_at(clock: &ManualClock) -> TaskState {
        TaskState::new("news")
            .with_clock(Arc::new(clock.clone()))
            .with_schedule(TaskSchedule::default())
            .unwrap()
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = TaskState::new("news");
        let snap = state.snapshot();
        assert_eq!(snap.status, TaskStatus::Idle);
        assert!(snap.last_run.is_none());
        assert!(snap.error.is_none());
    }

    #[test]
    fn test_begin_is_single_flight() {
        let clock = ManualClock::new(at(10, 0));
        let state = state_at(&clock);

        let guard = state.begin().unwrap();
        assert_eq!(state.status(), TaskStatus::Running);
        assert_eq!(state.last_run(), Some(at(10, 0)));

        let second = state.begin();
        assert!(matches!(second, Err(DigestError::AlreadyRunning(_))));
        assert_eq!(state.status(), TaskStatus::Running);

        guard.complete();
        assert_eq!(state.status(), TaskStatus::Completed);
        assert!(state.begin().is_ok());
    }

    #[test]
    fn test_fail_records_error_and_next_begin_clears_it() {
        let state = TaskState::new("news");
        state.begin().unwrap().fail("backend down");
        let snap = state.snapshot();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("backend down"));

        let guard = state.begin().unwrap();
        assert!(state.snapshot().error.is_none());
        guard.complete();
    }

    #[test]
    fn test_dropped_guard_never_leaves_running() {
        let state = TaskState::new("news");
        {
            let _guard = state.begin().unwrap();
        }
        assert_eq!(state.status(), TaskStatus::Failed);
        assert!(state.snapshot().error.unwrap().contains("aborted"));
    }

    #[test]
    fn test_eligibility_checks_in_order() {
        let clock = ManualClock::new(at(10, 0));
        let state = state_at(&clock);

        assert_eq!(state.check_eligibility(at(10, 0)), Eligibility::Ready);
        assert_eq!(state.check_eligibility(at(8, 0)), Eligibility::OutsideWindow);
        assert_eq!(state.check_eligibility(at(17, 31)), Eligibility::OutsideWindow);

        let guard = state.begin().unwrap();
        assert_eq!(state.check_eligibility(at(12, 0)), Eligibility::AlreadyRunning);
        guard.complete();

        state.set_enabled(false);
        assert_eq!(state.check_eligibility(at(12, 0)), Eligibility::Disabled);
    }

    #[test]
    fn test_interval_and_completed_reset() {
        let clock = ManualClock::new(at(10, 0));
        let state = state_at(&clock);
        state.begin().unwrap().complete();

        let early = state.check_eligibility(at(10, 30));
        assert!(matches!(early, Eligibility::IntervalNotReached { elapsed_minutes } if (elapsed_minutes - 30.0).abs() < 1e-9));
        assert_eq!(state.status(), TaskStatus::Completed);

        assert_eq!(state.check_eligibility(at(11, 0)), Eligibility::Ready);
        assert_eq!(state.status(), TaskStatus::Idle);
    }

    #[test]
    fn test_failed_is_not_reset_but_stays_eligible() {
        let clock = ManualClock::new(at(10, 0));
        let state = state_at(&clock);
        state.begin().unwrap().fail("boom");
        clock.advance(Duration::hours(1));
        assert!(state.check_eligibility(clock.now()).is_ready());
        assert_eq!(state.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_invalid_schedule_is_rejected_in_place() {
        let state = TaskState::new("news");
        let bad = TaskSchedule {
            interval_minutes: 0.0,
            ..Default::default()
        };
        assert!(state.set_schedule(bad).is_err());
        assert_eq!(state.schedule(), TaskSchedule::default());
    }

    #[test]
    fn test_toggle_enabled() {
        let state = TaskState::new("news");
        assert!(!state.toggle_enabled());
        assert!(!state.is_enabled());
        assert!(state.toggle_enabled());
    }
}
