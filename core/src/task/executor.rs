//! Script task execution loop

use crate::barrier::{Barrier, ScriptBarriers};
use crate::error::{BarrierError, BarrierResult};
use crate::identity::WorkerIdentity;

use super::stats::TaskStats;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Barrier every task passes after incrementing the shared counter
pub const INCREMENT_BARRIER: &str = "after-increment";

/// Barrier every task passes after checking the shared counter
pub const ASSERT_BARRIER: &str = "after-assert";

/// Barrier every task passes after resetting the shared counter
pub const RESET_BARRIER: &str = "after-reset";

/// A script task runs rounds of: increment -> wait -> check -> wait -> reset -> wait
///
/// Every task in the cluster shares one counter. The check after the first
/// barrier only holds if that barrier kept every task back until all of them
/// had incremented, so a task that sees the wrong count has caught a barrier
/// releasing early.
pub struct ScriptTask {
    /// Task identifier within the cluster
    id: usize,

    worker: WorkerIdentity,

    increment: Barrier,
    assertion: Barrier,
    reset: Barrier,

    /// Counter shared by every task in the cluster
    counter: Arc<AtomicUsize>,

    /// Value the counter holds once every task has incremented
    expected: usize,

    rounds: usize,

    /// Bound on each barrier wait
    wait_timeout: Option<Duration>,
}

impl ScriptTask {
    /// Create a task, joining its three barriers
    pub fn new(
        id: usize,
        barriers: &ScriptBarriers,
        counter: Arc<AtomicUsize>,
        expected: usize,
        rounds: usize,
    ) -> BarrierResult<Self> {
        Ok(Self {
            id,
            worker: barriers.worker().clone(),
            increment: barriers.barrier(INCREMENT_BARRIER)?,
            assertion: barriers.barrier(ASSERT_BARRIER)?,
            reset: barriers.barrier(RESET_BARRIER)?,
            counter,
            expected,
            rounds,
            wait_timeout: None,
        })
    }

    /// Bound each barrier wait
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Run the configured rounds.
    ///
    /// Stops early, without error, when a shutdown signal arrives. The task's
    /// barriers are cancelled when it finishes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> BarrierResult<TaskStats> {
        let mut stats = TaskStats::new();
        stats.start();

        tracing::debug!(task_id = self.id, worker = %self.worker, "Script task started");

        for round in 0..self.rounds {
            if matches!(shutdown.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_))) {
                tracing::debug!(task_id = self.id, "Script task received shutdown signal");
                break;
            }

            match self.run_round(&mut stats, &mut shutdown).await {
                Ok(()) => stats.record_round(),
                Err(BarrierError::Interrupted(group)) => {
                    tracing::debug!(task_id = self.id, round, group = %group, "Script task interrupted");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = self.id,
                        worker = %self.worker,
                        round,
                        error = %e,
                        "Round failed"
                    );
                    return Err(e);
                }
            }
        }

        self.cancel_barriers();

        stats.stop();
        tracing::debug!(
            task_id = self.id,
            rounds = stats.rounds,
            waits = stats.waits,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Script task finished"
        );

        Ok(stats)
    }

    async fn run_round(
        &self,
        stats: &mut TaskStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> BarrierResult<()> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.pass(&self.increment, stats, shutdown).await?;

        let seen = self.counter.load(Ordering::SeqCst);
        if seen != self.expected {
            return Err(BarrierError::simulation(format!(
                "task {} on {} saw {} increments, expected {}",
                self.id, self.worker, seen, self.expected
            )));
        }

        self.pass(&self.assertion, stats, shutdown).await?;
        self.counter.store(0, Ordering::SeqCst);
        self.pass(&self.reset, stats, shutdown).await
    }

    async fn pass(
        &self,
        barrier: &Barrier,
        stats: &mut TaskStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> BarrierResult<()> {
        let start = Instant::now();

        match self.wait_timeout {
            Some(timeout) => {
                let released = tokio::select! {
                    biased;

                    released = barrier.wait_timeout(timeout) => released?,

                    // Dropping the wait cancels the barrier.
                    _ = shutdown.recv() => {
                        return Err(BarrierError::Interrupted(barrier.name().to_string()));
                    }
                };

                if !released {
                    return Err(BarrierError::simulation(format!(
                        "task {} timed out after {:?} waiting on '{}'",
                        self.id,
                        timeout,
                        barrier.name()
                    )));
                }
            }
            None => barrier.wait_interruptibly(shutdown).await?,
        }

        stats.record_wait(start.elapsed());
        Ok(())
    }

    /// Leave every barrier. After a shutdown the console may already be gone,
    /// so failures are only logged.
    fn cancel_barriers(&self) {
        for barrier in [&self.increment, &self.assertion, &self.reset] {
            if let Err(e) = barrier.cancel() {
                tracing::warn!(task_id = self.id, group = barrier.name(), error = %e, "Failed to cancel barrier");
            }
        }
    }

    /// Get the task ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// The worker process the task belongs to
    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }
}

impl std::fmt::Debug for ScriptTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTask")
            .field("id", &self.id)
            .field("worker", &self.worker)
            .field("expected", &self.expected)
            .field("rounds", &self.rounds)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}
