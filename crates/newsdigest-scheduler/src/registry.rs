//! Task Registry — maps task ids to live task objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::task::ScheduledTask;

/// Registry of all scheduled tasks, iterated in id order.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Arc<dyn ScheduledTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Returns the entry it replaced, if any.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        task: Arc<dyn ScheduledTask>,
    ) -> Option<Arc<dyn ScheduledTask>> {
        self.tasks.insert(id.into(), task)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ScheduledTask>> {
        self.tasks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ScheduledTask>)> {
        self.tasks.iter().map(|(id, task)| (id.as_str(), task))
    }

    /// Owned copy of every entry, so callers can release the registry lock
    /// before awaiting anything.
    pub fn entries(&self) -> Vec<(String, Arc<dyn ScheduledTask>)> {
        self.tasks
            .iter()
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Smallest `interval_minutes` across all tasks, `None` when empty.
    pub fn min_interval_minutes(&self) -> Option<f64> {
        self.tasks
            .values()
            .map(|t| t.state().schedule().interval_minutes)
            .reduce(f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineContext;
    use crate::pipeline_task::PipelineTask;
    use newsdigest_core::schedule::TaskSchedule;

    fn task(name: &str, interval: f64) -> Arc<dyn ScheduledTask> {
        Arc::new(
            PipelineTask::from_fn(name, PipelineContext::new(), |_ctx| async { Ok(()) })
                .with_schedule(TaskSchedule::all_day(interval))
                .unwrap(),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = TaskRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.register("news", task("news", 15.0)).is_none());
        assert!(reg.contains("news"));
        assert_eq!(reg.get("news").unwrap().name(), "news");
        assert!(reg.get("missing").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_overwrites() {
        let mut reg = TaskRegistry::new();
        reg.register("news", task("first", 15.0));
        let previous = reg.register("news", task("second", 15.0));
        assert_eq!(previous.unwrap().name(), "first");
        assert_eq!(reg.get("news").unwrap().name(), "second");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_iteration_is_ordered_by_id() {
        let mut reg = TaskRegistry::new();
        reg.register("us", task("us", 30.0));
        reg.register("headline", task("headline", 30.0));
        reg.register("tw", task("tw", 30.0));
        assert_eq!(reg.ids(), vec!["headline", "tw", "us"]);
        let names: Vec<_> = reg.iter().map(|(id, _)| id).collect();
        assert_eq!(names, vec!["headline", "tw", "us"]);
    }

    #[test]
    fn test_min_interval() {
        let mut reg = TaskRegistry::new();
        assert_eq!(reg.min_interval_minutes(), None);
        reg.register("slow", task("slow", 60.0));
        reg.register("fast", task("fast", 15.0));
        assert_eq!(reg.min_interval_minutes(), Some(15.0));
    }
}
