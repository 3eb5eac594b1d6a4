//! Authoritative, single-process barrier groups

use std::fmt;
use std::sync::Arc;

use crate::error::BarrierResult;
use crate::group::{cancel_all_via, BarrierGroup, GroupCore, GroupListener, GroupStatus, ListenerId};
use crate::identity::BarrierIdentity;
use crate::messages::BarrierMessage;
use crate::transport::MessageSender;

use super::{BarrierGroups, GroupRegistry, RegisteredGroup};

/// Barrier groups that decide release themselves.
///
/// Used by a worker process that runs without a console, and as the console's
/// ground truth. The console flavour is built with [`LocalGroups::broadcasting`]:
/// every release is also sent to the agents as an `OpenBarrier` message.
pub struct LocalGroups {
    registry: GroupRegistry<LocalGroup>,
    broadcaster: Option<Arc<dyn MessageSender>>,
}

impl LocalGroups {
    /// Create an empty set of local groups
    pub fn new() -> Self {
        Self {
            registry: GroupRegistry::new(),
            broadcaster: None,
        }
    }

    /// Create an empty set of groups that broadcast each release through `broadcaster`
    pub fn broadcasting(broadcaster: Arc<dyn MessageSender>) -> Self {
        Self {
            registry: GroupRegistry::new(),
            broadcaster: Some(broadcaster),
        }
    }

    /// Return the group called `name`, creating it if necessary
    pub fn group(&self, name: &str) -> Arc<LocalGroup> {
        self.registry.get_or_create(name, |core| LocalGroup {
            core,
            broadcaster: self.broadcaster.clone(),
        })
    }

    /// Number of live groups
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether there are no live groups
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LocalGroups {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierGroups for LocalGroups {
    fn get_group(&self, name: &str) -> Arc<dyn BarrierGroup> {
        self.group(name)
    }

    fn existing_group(&self, name: &str) -> Option<Arc<dyn BarrierGroup>> {
        self.registry
            .existing(name)
            .map(|g| g as Arc<dyn BarrierGroup>)
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        self.registry.cancel_all()
    }
}

impl fmt::Display for LocalGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalGroups{}", self.registry)
    }
}

/// A barrier group that releases its waiters as soon as every barrier has one
pub struct LocalGroup {
    core: GroupCore,
    broadcaster: Option<Arc<dyn MessageSender>>,
}

impl LocalGroup {
    fn release_if_satisfied(&self) -> BarrierResult<()> {
        let released = self.core.drain_if_satisfied();

        if released.is_empty() {
            return Ok(());
        }

        self.core.fire_awaken(&released);

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(BarrierMessage::OpenBarrier {
                name: self.core.name().to_string(),
                waiters: released,
            })?;
        }

        Ok(())
    }
}

impl RegisteredGroup for LocalGroup {
    fn core(&self) -> &GroupCore {
        &self.core
    }
}

impl BarrierGroup for LocalGroup {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn add_listener(&self, listener: Arc<dyn GroupListener>) -> ListenerId {
        self.core.listeners().add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.core.listeners().remove(id);
    }

    fn add_barrier(&self) -> BarrierResult<()> {
        self.core.add_barrier()?;
        self.release_if_satisfied()
    }

    fn remove_barriers(&self, n: u64) -> BarrierResult<()> {
        self.core.remove_barriers(n)?;
        self.release_if_satisfied()
    }

    fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()> {
        self.core.add_waiter(identity)?;
        self.release_if_satisfied()
    }

    fn cancel_waiter(&self, identity: &BarrierIdentity) -> BarrierResult<()> {
        self.core.cancel_waiter(identity);
        Ok(())
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        cancel_all_via(self, &self.core)
    }

    fn status(&self) -> GroupStatus {
        self.core.status()
    }
}

impl fmt::Display for LocalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.core, f)
    }
}
