//! Aggregate execution counters for worker-driven runs.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub tasks_executed: u64,
    pub tasks_failed: u64,
    /// Running mean over every dispatch, in seconds.
    pub average_execution_time: f64,
}

impl ExecutionMetrics {
    /// Count one dispatch. Exactly one of the two counters moves.
    pub fn record(&mut self, elapsed: Duration, success: bool) {
        if success {
            self.tasks_executed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let n = self.total_dispatches() as f64;
        self.average_execution_time =
            (self.average_execution_time * (n - 1.0) + elapsed.as_secs_f64()) / n;
    }

    pub fn total_dispatches(&self) -> u64 {
        self.tasks_executed + self.tasks_failed
    }
}
