//! Result aggregation from multiple script tasks

use std::time::Duration;

use crate::task::TaskStats;

/// Aggregated statistics from all script tasks
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of tasks that completed
    pub total_tasks: usize,

    /// Total rounds completed
    pub total_rounds: usize,

    /// Total released barrier waits
    pub total_waits: usize,

    /// Maximum duration across all tasks
    pub total_duration: Duration,

    /// Mean time per released wait
    pub mean_wait: Duration,

    /// Longest single wait
    pub max_wait: Duration,

    /// Overall rounds per second
    pub rounds_per_second: f64,
}

/// Aggregate statistics from multiple tasks
pub fn aggregate_task_stats(stats: &[TaskStats]) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats::default();
    }

    let mut merged = TaskStats::new();
    for s in stats {
        merged.merge(s);
    }

    // Use the maximum elapsed time across all tasks
    let total_duration = stats
        .iter()
        .filter_map(|s| s.elapsed())
        .max()
        .unwrap_or(Duration::ZERO);

    let secs = total_duration.as_secs_f64();
    let rounds_per_second = if secs > 0.0 {
        merged.rounds as f64 / secs
    } else {
        0.0
    };

    AggregatedStats {
        total_tasks: stats.len(),
        total_rounds: merged.rounds,
        total_waits: merged.waits,
        total_duration,
        mean_wait: merged.mean_wait(),
        max_wait: merged.max_wait,
        rounds_per_second,
    }
}
