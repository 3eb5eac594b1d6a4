//! Barrier group registries
//!
//! A registry maps names to barrier groups, creating a group the first time its
//! name is asked for and forgetting it when the group retires. A retired group
//! is never handed out again; asking for the name afterwards creates a new group.

mod local;
mod replica;

pub use local::{LocalGroup, LocalGroups};
pub use replica::{ReplicaGroup, ReplicaGroups};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::BarrierResult;
use crate::group::{BarrierGroup, GroupCore, RetireHook};

/// A set of named barrier groups
pub trait BarrierGroups: Send + Sync {
    /// Return the group called `name`, creating it if necessary
    fn get_group(&self, name: &str) -> Arc<dyn BarrierGroup>;

    /// Return the group called `name` if it exists
    fn existing_group(&self, name: &str) -> Option<Arc<dyn BarrierGroup>>;

    /// Cancel every group. Used at shutdown.
    fn cancel_all(&self) -> BarrierResult<()>;
}

/// A group flavour that can be stored in a [`GroupRegistry`]
pub(crate) trait RegisteredGroup: BarrierGroup + 'static {
    fn core(&self) -> &GroupCore;
}

type GroupMap<G> = Mutex<HashMap<String, Arc<G>>>;

/// Name to group map shared by every registry flavour.
///
/// The map has its own lock. It is never held while a group's lock is taken,
/// except through group creation.
pub(crate) struct GroupRegistry<G> {
    groups: Arc<GroupMap<G>>,
}

impl<G: RegisteredGroup> GroupRegistry<G> {
    pub(crate) fn new() -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the existing group or register one built by `create`
    pub(crate) fn get_or_create(&self, name: &str, create: impl FnOnce(GroupCore) -> G) -> Arc<G> {
        let mut groups = self.groups.lock();

        if let Some(existing) = groups.get(name) {
            return Arc::clone(existing);
        }

        let core = GroupCore::new(name).with_retire_hook(retire_hook(Arc::downgrade(&self.groups)));
        let group = Arc::new(create(core));
        groups.insert(name.to_string(), Arc::clone(&group));

        tracing::debug!(group = name, "Barrier group created");
        group
    }

    pub(crate) fn existing(&self, name: &str) -> Option<Arc<G>> {
        self.groups.lock().get(name).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<G>> {
        self.groups.lock().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.lock().len()
    }

    /// Cancel every registered group.
    ///
    /// The groups are collected first and cancelled outside the map lock, since
    /// retiring a group takes that lock.
    pub(crate) fn cancel_all(&self) -> BarrierResult<()> {
        for group in self.snapshot() {
            group.cancel_all()?;
        }
        Ok(())
    }
}

fn retire_hook<G: RegisteredGroup>(groups: Weak<GroupMap<G>>) -> RetireHook {
    Box::new(move |core: &GroupCore| {
        let Some(groups) = groups.upgrade() else {
            return;
        };
        let mut groups = groups.lock();

        // Only forget the entry if it is still this instance.
        let same = groups
            .get(core.name())
            .is_some_and(|g| std::ptr::eq(g.core(), core));
        if same {
            groups.remove(core.name());
        }
    })
}

impl<G: RegisteredGroup> fmt::Display for GroupRegistry<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: Vec<_> = self.snapshot();
        groups.sort_by(|a, b| a.name().cmp(b.name()));

        write!(f, "{{")?;
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", group.name(), group.core())?;
        }
        write!(f, "}}")
    }
}
