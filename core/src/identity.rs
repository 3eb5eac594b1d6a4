//! Process and waiter identities
//!
//! Every worker process receives a [`WorkerIdentity`] from its agent at bootstrap.
//! Barrier waits are tagged with a [`BarrierIdentity`] scoped to that worker so the
//! console can tell wait cycles apart even after the identity has crossed a
//! message boundary.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of an agent process
#[derive(Debug)]
pub struct AgentIdentity {
    name: String,
    next_worker: AtomicU32,
}

impl AgentIdentity {
    /// Create an agent identity with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_worker: AtomicU32::new(0),
        }
    }

    /// Allocate the identity for the next worker process started by this agent
    pub fn create_worker_identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            agent: self.name.clone(),
            number: self.next_worker.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Identity of a worker process
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Name of the owning agent
    pub agent: String,
    /// Worker number within the agent
    pub number: u32,
}

impl WorkerIdentity {
    /// Create a worker identity
    pub fn new(agent: impl Into<String>, number: u32) -> Self {
        Self {
            agent: agent.into(),
            number,
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.agent, self.number)
    }
}

/// Identifies one wait attempt on a barrier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BarrierIdentity {
    /// Process that owns the waiter
    pub scope: WorkerIdentity,
    /// Sequence number within the scope
    pub sequence: u64,
}

impl fmt::Display for BarrierIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.sequence)
    }
}

/// Generates barrier identities for one process
#[derive(Debug)]
pub struct IdentityGenerator {
    scope: WorkerIdentity,
    next: AtomicU64,
}

impl IdentityGenerator {
    /// Create a generator whose identities are scoped to `scope`
    pub fn new(scope: WorkerIdentity) -> Self {
        Self {
            scope,
            next: AtomicU64::new(0),
        }
    }

    /// The scope shared by every identity this generator creates
    pub fn scope(&self) -> &WorkerIdentity {
        &self.scope
    }

    /// Create a new, unique identity
    pub fn next(&self) -> BarrierIdentity {
        BarrierIdentity {
            scope: self.scope.clone(),
            sequence: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}
