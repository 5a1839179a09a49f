//! Scheduler Service — the loop that checks tasks and the workers that run them.
//!
//! ## Architecture
//! ```text
//! scheduling loop (every scan interval, wakes early on schedule updates)
//!   ├── for each registered task: enabled? not running? in window? interval elapsed?
//!   └── eligible → bounded queue
//!
//! worker pool (N consumers)
//!   ├── pop task
//!   ├── acquire permit (shared semaphore, caps simultaneous runs)
//!   ├── task.execute()
//!   └── release permit, record metrics, mark queue item done
//! ```
//!
//! Stopping cancels the loop and the idle workers. A task body that is
//! already executing is left to finish.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use newsdigest_core::config::SchedulerConfig;
use newsdigest_core::error::{DigestError, Result};
use newsdigest_core::schedule::TaskSchedule;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::context::PipelineContext;
use crate::metrics::ExecutionMetrics;
use crate::registry::TaskRegistry;
use crate::task::{Eligibility, ScheduledTask, TaskInfo, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Stopped,
    Running,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Running => write!(f, "running"),
        }
    }
}

/// Validity window passed to [`SchedulerService::start_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LicenseWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LicenseWindow {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskBrief {
    pub status: TaskStatus,
    pub last_run: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub service_status: ServiceStatus,
    pub start_datetime: Option<NaiveDateTime>,
    pub license_end_datetime: Option<NaiveDateTime>,
    pub tasks: BTreeMap<String, TaskBrief>,
}

struct QueuedTask {
    id: String,
    task: Arc<dyn ScheduledTask>,
}

struct Runtime {
    status: ServiceStatus,
    window: Option<LicenseWindow>,
    cancel: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    registry: RwLock<TaskRegistry>,
    runtime: Mutex<Runtime>,
    queue_tx: mpsc::Sender<QueuedTask>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>,
    /// Ids sitting in the queue or being run by a worker.
    queued: Mutex<HashSet<String>>,
    outstanding: AtomicUsize,
    drained: Notify,
    permits: Arc<Semaphore>,
    metrics: Mutex<ExecutionMetrics>,
    /// Cuts the loop's sleep short after a schedule change.
    wake: Notify,
}

/// Process-wide scheduler. Cheap to clone; all clones share one instance.
#[derive(Clone)]
pub struct SchedulerService {
    inner: Arc<Inner>,
}

impl SchedulerService {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!("⚠️ Scheduler config out of range, clamping: {}", e);
        }
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                registry: RwLock::new(TaskRegistry::new()),
                runtime: Mutex::new(Runtime {
                    status: ServiceStatus::Stopped,
                    window: None,
                    cancel: None,
                    handles: Vec::new(),
                }),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                queued: Mutex::new(HashSet::new()),
                outstanding: AtomicUsize::new(0),
                drained: Notify::new(),
                permits,
                metrics: Mutex::new(ExecutionMetrics::default()),
                wake: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Add a task, optionally applying a schedule first. An existing entry
    /// with the same id is replaced.
    pub fn register_task(
        &self,
        id: impl Into<String>,
        task: Arc<dyn ScheduledTask>,
        schedule: Option<TaskSchedule>,
    ) -> Result<()> {
        let id = id.into();
        if let Some(schedule) = schedule {
            task.state().set_schedule(schedule)?;
        }
        let replaced = self.inner.registry.write().register(id.clone(), task);
        if replaced.is_some() {
            tracing::warn!("⚠️ Task '{}' re-registered, previous entry replaced", id);
        } else {
            tracing::info!("📅 Task registered: {}", id);
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Start the scheduling loop and the worker pool.
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// running only replaces the license window.
    pub fn start_service(&self, start: NaiveDateTime, license_end: NaiveDateTime) -> Result<()> {
        let now = self.inner.clock.now();
        if now > license_end {
            tracing::warn!("⛔ Refusing to start: license expired at {}", license_end);
            return Err(DigestError::LicenseExpired(license_end));
        }
        if start > license_end {
            return Err(DigestError::Config(format!(
                "license start {start} is after license end {license_end}"
            )));
        }

        let mut runtime = self.inner.runtime.lock();
        runtime.window = Some(LicenseWindow {
            start,
            end: license_end,
        });
        if runtime.status == ServiceStatus::Running {
            tracing::info!("🔄 Scheduler already running, license window updated");
            return Ok(());
        }

        runtime.status = ServiceStatus::Running;
        let cancel = CancellationToken::new();
        for worker_id in 0..self.inner.config.worker_count {
            runtime.handles.push(tokio::spawn(worker_loop(
                self.inner.clone(),
                worker_id,
                cancel.clone(),
            )));
        }
        runtime
            .handles
            .push(tokio::spawn(scheduler_loop(self.inner.clone(), cancel.clone())));
        runtime.cancel = Some(cancel);

        tracing::info!(
            "⏰ Scheduler service started ({} workers, {} permits, license until {})",
            self.inner.config.worker_count,
            self.inner.config.max_concurrent_tasks,
            license_end
        );
        Ok(())
    }

    /// Stop scheduling. Idle workers exit immediately, busy ones after their
    /// current task.
    pub fn stop_service(&self) {
        let mut runtime = self.inner.runtime.lock();
        runtime.status = ServiceStatus::Stopped;
        if let Some(cancel) = runtime.cancel.take() {
            cancel.cancel();
        }
        runtime.handles.clear();
        tracing::info!("🛑 Scheduler service stopped");
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.inner.runtime.lock().status
    }

    pub fn license_window(&self) -> Option<LicenseWindow> {
        self.inner.runtime.lock().window
    }

    /// Replace a task's schedule and re-evaluate immediately.
    pub fn update_task_schedule(&self, id: &str, schedule: TaskSchedule) -> Result<()> {
        let task = self.task(id)?;
        task.state().set_schedule(schedule.clone())?;
        self.inner.wake.notify_one();
        tracing::info!("🔧 Updated schedule for task {}: {:?}", id, schedule);
        Ok(())
    }

    /// Replace the pipeline arguments used from the next run on.
    pub fn update_task_context(&self, id: &str, context: PipelineContext) -> Result<()> {
        let task = self.task(id)?;
        task.set_context(context)?;
        tracing::info!("🔧 Updated pipeline context for task {}", id);
        Ok(())
    }

    /// Flip a task's `enabled` flag. Returns the new value.
    pub fn toggle_task(&self, id: &str) -> Result<bool> {
        let task = self.task(id)?;
        let enabled = task.state().toggle_enabled();
        self.inner.wake.notify_one();
        tracing::info!("🔧 Task {} {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }

    /// Run a task now, outside the queue and the concurrency cap.
    pub async fn start_task(&self, id: &str) -> Result<()> {
        let task = self.task(id)?;
        if task.state().status() == TaskStatus::Running {
            return Err(DigestError::AlreadyRunning(id.to_string()));
        }
        tracing::info!("👆 Manual trigger: {}", id);
        task.execute().await
    }

    pub fn get_task_info(&self, id: &str) -> Result<TaskInfo> {
        let task = self.task(id)?;
        Ok(task_info(id, task.as_ref()))
    }

    pub fn get_all_task_info(&self) -> BTreeMap<String, TaskInfo> {
        self.inner
            .registry
            .read()
            .iter()
            .map(|(id, task)| (id.to_string(), task_info(id, task.as_ref())))
            .collect()
    }

    pub fn get_status(&self) -> SchedulerStatus {
        let (service_status, window) = {
            let runtime = self.inner.runtime.lock();
            (runtime.status, runtime.window)
        };
        let tasks = self
            .inner
            .registry
            .read()
            .iter()
            .map(|(id, task)| {
                let snapshot = task.get_status();
                (
                    id.to_string(),
                    TaskBrief {
                        status: snapshot.status,
                        last_run: snapshot.last_run,
                    },
                )
            })
            .collect();
        SchedulerStatus {
            service_status,
            start_datetime: window.map(|w| w.start),
            license_end_datetime: window.map(|w| w.end),
            tasks,
        }
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Tasks enqueued or running on a worker.
    pub fn queued_count(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Resolve once every enqueued task has been processed by a worker.
    pub async fn wait_queue_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Time between two scheduling passes.
    pub fn scan_interval(&self) -> Duration {
        self.inner.scan_interval()
    }

    fn task(&self, id: &str) -> Result<Arc<dyn ScheduledTask>> {
        self.inner
            .registry
            .read()
            .get(id)
            .ok_or_else(|| DigestError::TaskNotFound(id.to_string()))
    }
}

/// Shortest pause between two scheduling passes.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(1);
/// Longest pause between two scheduling passes, however long the intervals.
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

fn clamp_scan_interval(minutes: f64) -> Duration {
    if minutes.is_nan() {
        return MIN_SCAN_INTERVAL;
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map(|d| d.clamp(MIN_SCAN_INTERVAL, MAX_SCAN_INTERVAL))
        .unwrap_or(if minutes < 0.0 { MIN_SCAN_INTERVAL } else { MAX_SCAN_INTERVAL })
}

fn task_info(id: &str, task: &dyn ScheduledTask) -> TaskInfo {
    let snapshot = task.get_status();
    let schedule = task.state().schedule();
    TaskInfo {
        task_id: id.to_string(),
        name: task.name().to_string(),
        status: snapshot.status,
        last_run: snapshot.last_run,
        error: snapshot.error,
        enabled: schedule.enabled,
        schedule,
    }
}

impl Inner {
    fn scan_interval(&self) -> Duration {
        let minutes = self
            .registry
            .read()
            .min_interval_minutes()
            .unwrap_or(self.config.default_scan_interval_minutes);
        clamp_scan_interval(minutes)
    }

    /// One pass over the registry. Returns how many tasks were enqueued.
    fn run_pass(&self) -> Result<usize> {
        let now = self.clock.now();
        let window = self.runtime.lock().window;
        if let Some(window) = window
            && !window.contains(now)
        {
            tracing::warn!("⛔ {} is outside the license window, nothing dispatched", now);
            return Ok(0);
        }

        let entries = self.registry.read().entries();
        let mut enqueued = 0;
        for (id, task) in entries {
            if self.queued.lock().contains(&id) {
                tracing::debug!("Task {} already queued", id);
                continue;
            }
            match task.state().check_eligibility(now) {
                Eligibility::Ready => {
                    tracing::info!("🔔 Task {} is ready to execute", id);
                    if self.enqueue(id, task)? {
                        enqueued += 1;
                    }
                }
                other => tracing::debug!("Task {} skipped: {:?}", id, other),
            }
        }
        Ok(enqueued)
    }

    fn enqueue(&self, id: String, task: Arc<dyn ScheduledTask>) -> Result<bool> {
        self.queued.lock().insert(id.clone());
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        match self.queue_tx.try_send(QueuedTask {
            id: id.clone(),
            task,
        }) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.task_done(&id);
                tracing::warn!("⚠️ Task queue full, {} will be retried next pass", id);
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => {
                self.task_done(&id);
                Err(DigestError::Scheduler("task queue closed".into()))
            }
        }
    }

    async fn next_queued(&self) -> Option<QueuedTask> {
        self.queue_rx.lock().await.recv().await
    }

    async fn dispatch(&self, worker_id: usize, item: QueuedTask) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            tracing::error!("❌ Worker {} lost the concurrency semaphore", worker_id);
            self.task_done(&item.id);
            return;
        };

        // The window may have closed or the task been disabled while it waited.
        let eligibility = item.task.state().check_eligibility(self.clock.now());
        if !eligibility.is_ready() {
            tracing::debug!("Task {} dropped before dispatch: {:?}", item.id, eligibility);
            drop(permit);
            self.task_done(&item.id);
            return;
        }

        tracing::info!("⚙️ Worker {} executing task {}", worker_id, item.id);
        let started = Instant::now();
        let outcome = item.task.execute().await;
        drop(permit);
        let elapsed = started.elapsed();

        match &outcome {
            Ok(()) => tracing::info!(
                "✅ Task {} finished in {:.2}s",
                item.id,
                elapsed.as_secs_f64()
            ),
            Err(e) => tracing::warn!("⚠️ Task {} failed after {:.2}s: {}", item.id, elapsed.as_secs_f64(), e),
        }
        self.metrics.lock().record(elapsed, outcome.is_ok());
        self.task_done(&item.id);
    }

    fn task_done(&self, id: &str) {
        self.queued.lock().remove(id);
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

async fn scheduler_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    tracing::info!("⏰ Scheduler loop started");

    while !cancel.is_cancelled() {
        match inner.run_pass() {
            Ok(enqueued) => {
                let pause = inner.scan_interval();
                tracing::debug!("Enqueued {} task(s), next check in {:?}", enqueued, pause);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = inner.wake.notified() => {
                        tracing::info!("Sleep interrupted due to configuration update");
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            Err(e) => {
                tracing::error!("❌ Scheduler loop error: {}", e);
                let backoff = Duration::from_secs(inner.config.loop_backoff_secs);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    tracing::info!("⏰ Scheduler loop stopped");
}

async fn worker_loop(inner: Arc<Inner>, worker_id: usize, cancel: CancellationToken) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = inner.next_queued() => item,
        };
        let Some(item) = item else { break };
        inner.dispatch(worker_id, item).await;
    }

    tracing::debug!("Worker {} stopped", worker_id);
}
