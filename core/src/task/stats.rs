//! Script task statistics tracking

use std::time::{Duration, Instant};

/// Statistics tracked by each script task
#[derive(Debug, Default, Clone)]
pub struct TaskStats {
    /// Number of rounds completed
    pub rounds: usize,

    /// Number of barrier waits that were released
    pub waits: usize,

    /// Total time spent waiting on barriers
    pub wait_time: Duration,

    /// Longest single barrier wait
    pub max_wait: Duration,

    /// Task start time
    pub started_at: Option<Instant>,

    /// Task end time
    pub ended_at: Option<Instant>,
}

impl TaskStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Mean time per released wait
    pub fn mean_wait(&self) -> Duration {
        if self.waits == 0 {
            Duration::ZERO
        } else {
            self.wait_time / self.waits as u32
        }
    }

    /// Record a released barrier wait
    pub fn record_wait(&mut self, waited: Duration) {
        self.waits += 1;
        self.wait_time += waited;
        self.max_wait = self.max_wait.max(waited);
    }

    /// Record a completed round
    pub fn record_round(&mut self) {
        self.rounds += 1;
    }

    /// Merge stats from another task
    pub fn merge(&mut self, other: &TaskStats) {
        self.rounds += other.rounds;
        self.waits += other.waits;
        self.wait_time += other.wait_time;
        self.max_wait = self.max_wait.max(other.max_wait);
    }
}
