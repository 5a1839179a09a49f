//! Pipeline task — turns an async pipeline function into a scheduled task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use newsdigest_core::error::{DigestError, Result};
use newsdigest_core::schedule::TaskSchedule;
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::context::PipelineContext;
use crate::task::{ScheduledTask, TaskState};

/// Async pipeline entry point. Receives the task's context as bound at the
/// start of the run.
pub type PipelineFn =
    Arc<dyn Fn(PipelineContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct PipelineTask {
    state: TaskState,
    pipeline: PipelineFn,
    context: RwLock<PipelineContext>,
}

impl PipelineTask {
    pub fn new(name: impl Into<String>, pipeline: PipelineFn, context: PipelineContext) -> Self {
        Self {
            state: TaskState::new(name),
            pipeline,
            context: RwLock::new(context),
        }
    }

    /// Wrap a plain async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, context: PipelineContext, f: F) -> Self
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let pipeline: PipelineFn =
            Arc::new(move |ctx| -> BoxFuture<'static, Result<()>> { Box::pin(f(ctx)) });
        Self::new(name, pipeline, context)
    }

    pub fn with_schedule(mut self, schedule: TaskSchedule) -> Result<Self> {
        self.state = self.state.with_schedule(schedule)?;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state = self.state.with_clock(clock);
        self
    }
}

#[async_trait]
impl ScheduledTask for PipelineTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    async fn execute(&self) -> Result<()> {
        let guard = self.state.begin()?;
        // Bound now: context updates during the run apply to the next one.
        let context = self.context.read().clone();

        tracing::info!("🚀 Pipeline task started: '{}'", self.state.name());
        match (self.pipeline)(context).await {
            Ok(()) => {
                guard.complete();
                tracing::info!("✅ Pipeline task completed: '{}'", self.state.name());
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                guard.fail(message.clone());
                tracing::warn!("⚠️ Pipeline task '{}' failed: {}", self.state.name(), message);
                Err(DigestError::task_execution(self.state.name(), message))
            }
        }
    }

    fn context(&self) -> Option<PipelineContext> {
        Some(self.context.read().clone())
    }

    fn set_context(&self, context: PipelineContext) -> Result<()> {
        *self.context.write() = context;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::keys;
    use crate::task::TaskStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn seed(source_type: &str) -> PipelineContext {
        PipelineContext::new()
            .with(&keys::SOURCE_TYPE, source_type.to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_success_passes_context() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_in = seen.clone();
        let task = PipelineTask::from_fn("news", seed("tw"), move |ctx| {
            let seen = seen_in.clone();
            async move {
                *seen.lock() = ctx.get(&keys::SOURCE_TYPE);
                Ok(())
            }
        });

        task.execute().await.unwrap();
        let status = task.get_status();
        assert_eq!(status.status, TaskStatus::Completed);
        assert!(status.last_run.is_some());
        assert!(status.error.is_none());
        assert_eq!(seen.lock().as_deref(), Some("tw"));
    }

    #[tokio::test]
    async fn test_execute_failure_wraps_error() {
        let task = PipelineTask::from_fn("news", PipelineContext::new(), |_ctx| async {
            Err(DigestError::Http("connection refused".into()))
        });

        let err = task.execute().await.unwrap_err();
        assert!(matches!(err, DigestError::TaskExecution { ref task, .. } if task == "news"));
        assert!(err.to_string().contains("connection refused"));

        let status = task.get_status();
        assert_eq!(status.status, TaskStatus::Failed);
        assert!(status.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_concurrent_execute_is_rejected() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_in, started_in, runs_in) = (release.clone(), started.clone(), runs.clone());
        let task = Arc::new(PipelineTask::from_fn("news", PipelineContext::new(), move |_ctx| {
            let (release, started, runs) = (release_in.clone(), started_in.clone(), runs_in.clone());
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                started.notify_one();
                release.notified().await;
                Ok(())
            }
        }));

        let first = tokio::spawn({
            let task = task.clone();
            async move { task.execute().await }
        });
        started.notified().await;

        let second = task.execute().await;
        assert!(matches!(second, Err(DigestError::AlreadyRunning(_))));
        assert_eq!(task.state().status(), TaskStatus::Running);

        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.state().status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_context_update_applies_to_next_run() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (release_in, started_in, seen_in) = (release.clone(), started.clone(), seen.clone());
        let task = Arc::new(PipelineTask::from_fn("news", seed("tw"), move |ctx| {
            let (release, started, seen) = (release_in.clone(), started_in.clone(), seen_in.clone());
            async move {
                started.notify_one();
                release.notified().await;
                seen.lock().push(ctx.get(&keys::SOURCE_TYPE).unwrap_or_default());
                Ok(())
            }
        }));

        let run = tokio::spawn({
            let task = task.clone();
            async move { task.execute().await }
        });
        started.notified().await;
        task.set_context(seed("us")).unwrap();
        release.notify_one();
        run.await.unwrap().unwrap();

        let run = tokio::spawn({
            let task = task.clone();
            async move { task.execute().await }
        });
        started.notified().await;
        release.notify_one();
        run.await.unwrap().unwrap();

        assert_eq!(*seen.lock(), vec!["tw".to_string(), "us".to_string()]);
        assert_eq!(task.context().unwrap().get(&keys::SOURCE_TYPE).as_deref(), Some("us"));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let task = PipelineTask::from_fn("news", PipelineContext::new(), |_ctx| async { Ok(()) });
        let bad = TaskSchedule {
            interval_minutes: -1.0,
            ..Default::default()
        };
        assert!(task.with_schedule(bad).is_err());
    }
}
