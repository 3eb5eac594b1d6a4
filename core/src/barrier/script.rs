//! Barrier factory handed to test scripts

use std::sync::Arc;

use crate::error::{BarrierError, BarrierResult};
use crate::identity::{IdentityGenerator, WorkerIdentity};
use crate::registry::BarrierGroups;

use super::handle::Barrier;

// A group can retire between lookup and joining it.
const JOIN_ATTEMPTS: usize = 8;

/// Creates barriers for the script tasks of one worker process
#[derive(Clone)]
pub struct ScriptBarriers {
    groups: Arc<dyn BarrierGroups>,
    identities: Arc<IdentityGenerator>,
}

impl ScriptBarriers {
    /// Barriers over `groups`, with waiter identities scoped to `worker`
    pub fn new(groups: Arc<dyn BarrierGroups>, worker: WorkerIdentity) -> Self {
        Self {
            groups,
            identities: Arc::new(IdentityGenerator::new(worker)),
        }
    }

    /// The worker that owns the waiter identities
    pub fn worker(&self) -> &WorkerIdentity {
        self.identities.scope()
    }

    /// Join the barrier group called `name`
    pub fn barrier(&self, name: &str) -> BarrierResult<Barrier> {
        let mut attempt = 1;

        loop {
            let group = self.groups.get_group(name);

            match Barrier::new(group, Arc::clone(&self.identities)) {
                Err(BarrierError::InvalidGroup(_)) if attempt < JOIN_ATTEMPTS => {
                    tracing::debug!(group = name, attempt, "Group retired while joining, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for ScriptBarriers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBarriers")
            .field("worker", self.worker())
            .finish()
    }
}
