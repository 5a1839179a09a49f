//! # NewsDigest Scheduler
//!
//! Windowed task scheduler with a bounded worker pool and a sequential
//! pipeline executor.
//!
//! ## Design Principles
//! - Each task runs only inside its daily window, at most once per interval
//! - A task never runs twice at the same time, whoever triggers it
//! - A shared semaphore caps simultaneous executions across all workers
//! - Nothing runs outside the license window
//!
//! ## Architecture
//! ```text
//! SchedulerService
//!   ├── scheduling loop ── eligible tasks ──▶ bounded queue
//!   ├── worker × N ──▶ semaphore permit ──▶ ScheduledTask::execute
//!   ├── TaskRegistry (id → task)
//!   └── ExecutionMetrics
//!
//! PipelineTask ──▶ async pipeline fn ──▶ PipelineExecutor
//!                                          ├── step 1 (validate → execute → merge)
//!                                          ├── step 2
//!                                          └── step N
//! ```

pub mod clock;
pub mod context;
pub mod executor;
pub mod metrics;
pub mod pipeline_task;
pub mod registry;
pub mod service;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ContextKey, PipelineContext, keys};
pub use executor::{PipelineExecutor, PipelineStep};
pub use metrics::ExecutionMetrics;
pub use newsdigest_core::schedule::TaskSchedule;
pub use pipeline_task::{PipelineFn, PipelineTask};
pub use registry::TaskRegistry;
pub use service::{LicenseWindow, SchedulerService, SchedulerStatus, ServiceStatus, TaskBrief};
pub use task::{
    Eligibility, RunGuard, ScheduledTask, TaskInfo, TaskState, TaskStatus, TaskStatusSnapshot,
};
