//! Builder pattern for ScriptTask construction

use crate::barrier::ScriptBarriers;
use crate::error::{BarrierError, BarrierResult};

use super::executor::ScriptTask;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating ScriptTask instances
///
/// # Example
/// ```ignore
/// let task = ScriptTaskBuilder::new(0)
///     .barriers(barriers.clone())
///     .counter(counter.clone(), 15)
///     .rounds(3)
///     .build()?;
/// ```
pub struct ScriptTaskBuilder {
    id: usize,
    barriers: Option<ScriptBarriers>,
    counter: Option<Arc<AtomicUsize>>,
    expected: Option<usize>,
    rounds: Option<usize>,
    wait_timeout: Option<Duration>,
}

impl ScriptTaskBuilder {
    /// Create a new builder with the given task ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            barriers: None,
            counter: None,
            expected: None,
            rounds: None,
            wait_timeout: None,
        }
    }

    /// Set the barrier factory of the task's worker process
    pub fn barriers(mut self, barriers: ScriptBarriers) -> Self {
        self.barriers = Some(barriers);
        self
    }

    /// Set the shared counter and the number of tasks sharing it
    pub fn counter(mut self, counter: Arc<AtomicUsize>, expected: usize) -> Self {
        self.counter = Some(counter);
        self.expected = Some(expected);
        self
    }

    /// Set the number of rounds
    pub fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Bound each barrier wait
    pub fn wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Build the task, joining its barriers
    ///
    /// # Errors
    /// Returns an error if any required field is missing, or if a barrier
    /// cannot be joined.
    pub fn build(self) -> BarrierResult<ScriptTask> {
        let barriers = self
            .barriers
            .ok_or_else(|| BarrierError::missing_config("barriers"))?;
        let counter = self
            .counter
            .ok_or_else(|| BarrierError::missing_config("counter"))?;
        let expected = self
            .expected
            .ok_or_else(|| BarrierError::missing_config("counter"))?;
        let rounds = self
            .rounds
            .ok_or_else(|| BarrierError::missing_config("rounds"))?;

        let task = ScriptTask::new(self.id, &barriers, counter, expected, rounds)?;

        Ok(task.with_wait_timeout(self.wait_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::WorkerIdentity;
    use crate::registry::LocalGroups;

    fn barriers() -> ScriptBarriers {
        ScriptBarriers::new(Arc::new(LocalGroups::new()), WorkerIdentity::new("agent", 0))
    }

    #[test]
    fn test_builder_missing_barriers() {
        let result = ScriptTaskBuilder::new(0)
            .counter(Arc::new(AtomicUsize::new(0)), 1)
            .rounds(1)
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("barriers"));
    }

    #[test]
    fn test_builder_missing_counter() {
        let result = ScriptTaskBuilder::new(0).barriers(barriers()).rounds(1).build();

        assert!(result.unwrap_err().to_string().contains("counter"));
    }

    #[test]
    fn test_builder_missing_rounds() {
        let result = ScriptTaskBuilder::new(0)
            .barriers(barriers())
            .counter(Arc::new(AtomicUsize::new(0)), 1)
            .build();

        assert!(result.unwrap_err().to_string().contains("rounds"));
    }

    #[test]
    fn test_builder_joins_barriers() {
        let task = ScriptTaskBuilder::new(7)
            .barriers(barriers())
            .counter(Arc::new(AtomicUsize::new(0)), 1)
            .rounds(2)
            .build()
            .unwrap();

        assert_eq!(task.id(), 7);
        assert_eq!(task.worker(), &WorkerIdentity::new("agent", 0));
    }
}
