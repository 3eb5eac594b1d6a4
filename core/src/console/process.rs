//! One worker process's share of the console's barrier groups

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::BarrierResult;
use crate::group::{cancel_all_via, BarrierGroup, GroupCore, GroupListener, GroupStatus, ListenerId};
use crate::identity::BarrierIdentity;
use crate::registry::{BarrierGroups, GroupRegistry, RegisteredGroup};

/// The barriers and waiters a single worker process has contributed.
///
/// Every mutation is checked against the process's own share, then applied to
/// the console group of the same name. Cancelling all of these groups removes
/// exactly what the process contributed, which is how the console cleans up
/// after a worker that has gone away.
pub(crate) struct ProcessGroups {
    registry: GroupRegistry<ProcessGroup>,
    console: Arc<dyn BarrierGroups>,
}

impl ProcessGroups {
    pub(crate) fn new(console: Arc<dyn BarrierGroups>) -> Self {
        Self {
            registry: GroupRegistry::new(),
            console,
        }
    }

    pub(crate) fn group(&self, name: &str) -> Arc<ProcessGroup> {
        self.registry
            .get_or_create(name, |core| ProcessGroup::new(core, Arc::clone(&self.console)))
    }

    pub(crate) fn existing_group(&self, name: &str) -> Option<Arc<ProcessGroup>> {
        self.registry.existing(name)
    }

    pub(crate) fn cancel_all(&self) -> BarrierResult<()> {
        self.registry.cancel_all()
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.len()
    }
}

/// A worker's share of one console group
pub(crate) struct ProcessGroup {
    shadow: Arc<GroupCore>,
    groups: Arc<dyn BarrierGroups>,
    console: Mutex<ConsoleBinding>,
}

/// The console group a share currently delegates to
struct ConsoleBinding {
    group: Arc<dyn BarrierGroup>,
    listener: ListenerId,
}

impl ConsoleBinding {
    fn new(shadow: &Arc<GroupCore>, group: Arc<dyn BarrierGroup>) -> Self {
        // Releases are decided by the console group; forget our released waiters.
        let weak: Weak<GroupCore> = Arc::downgrade(shadow);
        let listener = group.add_listener(Arc::new(move |w: &HashSet<BarrierIdentity>| {
            if let Some(shadow) = weak.upgrade() {
                shadow.clear_waiters(w);
            }
        }));

        Self { group, listener }
    }
}

impl ProcessGroup {
    fn new(core: GroupCore, groups: Arc<dyn BarrierGroups>) -> Self {
        let shadow = Arc::new(core);
        let console = ConsoleBinding::new(&shadow, groups.get_group(shadow.name()));

        Self {
            shadow,
            groups,
            console: Mutex::new(console),
        }
    }

    /// The live console group of this name. A share that holds no barriers
    /// can outlast the console group it was bound to; it moves on to the
    /// group that replaced it.
    fn console(&self) -> Arc<dyn BarrierGroup> {
        let mut binding = self.console.lock();

        if binding.group.status().is_retired() {
            tracing::debug!(group = self.name(), "Rebinding worker share to new console group");
            binding.group.remove_listener(binding.listener);
            *binding = ConsoleBinding::new(&self.shadow, self.groups.get_group(self.name()));
        }

        Arc::clone(&binding.group)
    }
}

impl RegisteredGroup for ProcessGroup {
    fn core(&self) -> &GroupCore {
        &self.shadow
    }
}

impl BarrierGroup for ProcessGroup {
    fn name(&self) -> &str {
        self.shadow.name()
    }

    fn add_listener(&self, listener: Arc<dyn GroupListener>) -> ListenerId {
        self.shadow.listeners().add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.shadow.listeners().remove(id);
    }

    fn add_barrier(&self) -> BarrierResult<()> {
        let console = self.console();
        self.shadow.add_barrier()?;
        console.add_barrier()
    }

    fn remove_barriers(&self, n: u64) -> BarrierResult<()> {
        self.shadow.remove_barriers(n)?;
        let console = self.console();

        if self.shadow.status().is_retired() {
            console.remove_listener(self.console.lock().listener);
        }

        console.remove_barriers(n)
    }

    fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()> {
        self.shadow.add_waiter(identity.clone())?;

        if let Err(e) = self.console().add_waiter(identity.clone()) {
            self.shadow.cancel_waiter(&identity);
            return Err(e);
        }

        Ok(())
    }

    fn cancel_waiter(&self, identity: &BarrierIdentity) -> BarrierResult<()> {
        self.shadow.cancel_waiter(identity);
        self.console().cancel_waiter(identity)
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        cancel_all_via(self, &self.shadow)
    }

    fn status(&self) -> GroupStatus {
        self.shadow.status()
    }
}
