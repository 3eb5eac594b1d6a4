//! Process liveness reports
//!
//! The console receives periodic batches of worker process reports. A worker that
//! is missing from a batch, or reported as finished, is no longer alive.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::identity::WorkerIdentity;

/// Reported state of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Started, not yet running scripts
    Started,
    /// Running scripts
    Running,
    /// Exited
    Finished,
}

/// One worker process entry in a liveness batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    /// The worker
    pub worker: WorkerIdentity,
    /// Its state
    pub state: ProcessState,
}

impl ProcessReport {
    /// Report a running worker
    pub fn running(worker: WorkerIdentity) -> Self {
        Self {
            worker,
            state: ProcessState::Running,
        }
    }

    /// Report a finished worker
    pub fn finished(worker: WorkerIdentity) -> Self {
        Self {
            worker,
            state: ProcessState::Finished,
        }
    }

    /// Whether the worker is alive
    pub fn is_alive(&self) -> bool {
        self.state != ProcessState::Finished
    }
}

/// The set of workers a batch reports alive
pub fn live_workers(reports: &[ProcessReport]) -> HashSet<WorkerIdentity> {
    reports
        .iter()
        .filter(|r| r.is_alive())
        .map(|r| r.worker.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_workers_excludes_finished() {
        let a = WorkerIdentity::new("agent", 0);
        let b = WorkerIdentity::new("agent", 1);
        let c = WorkerIdentity::new("agent", 2);

        let live = live_workers(&[
            ProcessReport::running(a.clone()),
            ProcessReport::finished(b.clone()),
            ProcessReport {
                worker: c.clone(),
                state: ProcessState::Started,
            },
        ]);

        assert!(live.contains(&a));
        assert!(!live.contains(&b));
        assert!(live.contains(&c));
    }

    #[test]
    fn test_empty_batch() {
        assert!(live_workers(&[]).is_empty());
    }
}
