//! Bookkeeping shared by every barrier group flavour

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

use crate::error::{BarrierError, BarrierResult};
use crate::identity::BarrierIdentity;

use super::listeners::Listeners;
use super::GroupStatus;

/// Called once when a group retires, so the owning registry can forget it
pub(crate) type RetireHook = Box<dyn Fn(&GroupCore) + Send + Sync>;

#[derive(Debug, Default)]
struct Counts {
    barriers: u64,
    retired: bool,
    waiters: HashSet<BarrierIdentity>,
}

/// Barrier count, waiter set and listeners of one group.
///
/// Every group flavour wraps a `GroupCore` and adds its own release or
/// forwarding behaviour on top of these checks.
pub struct GroupCore {
    name: String,
    listeners: Listeners,
    // Invariant while valid: waiters.len() <= barriers.
    counts: Mutex<Counts>,
    on_retire: Option<RetireHook>,
}

impl GroupCore {
    /// Create the bookkeeping for a group with no barriers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Listeners::default(),
            counts: Mutex::new(Counts::default()),
            on_retire: None,
        }
    }

    pub(crate) fn with_retire_hook(mut self, hook: RetireHook) -> Self {
        self.on_retire = Some(hook);
        self
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered listeners
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    fn check_valid(&self, counts: &Counts) -> BarrierResult<()> {
        if counts.retired {
            return Err(BarrierError::InvalidGroup(self.name.clone()));
        }
        Ok(())
    }

    /// Add one barrier
    pub fn add_barrier(&self) -> BarrierResult<()> {
        let mut counts = self.counts.lock();
        self.check_valid(&counts)?;
        counts.barriers += 1;
        Ok(())
    }

    /// Remove `n` barriers, retiring the group if none remain
    pub fn remove_barriers(&self, n: u64) -> BarrierResult<()> {
        let retired = {
            let mut counts = self.counts.lock();
            self.check_valid(&counts)?;

            let free = counts.barriers - counts.waiters.len() as u64;
            if n > free {
                return Err(BarrierError::caller(format!(
                    "can't remove {} barriers from '{}' with {} barriers and {} waiters",
                    n,
                    self.name,
                    counts.barriers,
                    counts.waiters.len()
                )));
            }

            counts.barriers -= n;
            if counts.barriers == 0 {
                counts.retired = true;
            }
            counts.retired
        };

        if retired {
            tracing::debug!(group = %self.name, "Barrier group retired");
            if let Some(hook) = &self.on_retire {
                hook(self);
            }
        }

        Ok(())
    }

    /// Register a waiter
    pub fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()> {
        let mut counts = self.counts.lock();
        self.check_valid(&counts)?;

        if counts.barriers == 0 {
            return Err(BarrierError::caller(format!(
                "can't add waiter to '{}', no barriers",
                self.name
            )));
        }

        if counts.waiters.len() as u64 >= counts.barriers {
            return Err(BarrierError::invariant(format!(
                "'{}' already has {} waiters for {} barriers",
                self.name,
                counts.waiters.len(),
                counts.barriers
            )));
        }

        counts.waiters.insert(identity);
        Ok(())
    }

    /// Remove a waiter. Unknown identities are ignored.
    ///
    /// Returns whether the waiter was present.
    pub fn cancel_waiter(&self, identity: &BarrierIdentity) -> bool {
        self.counts.lock().waiters.remove(identity)
    }

    /// If every barrier has a waiter, remove and return all waiters.
    ///
    /// The caller notifies listeners after this returns, so that the group lock
    /// is not held while notifications travel.
    pub fn drain_if_satisfied(&self) -> HashSet<BarrierIdentity> {
        let mut counts = self.counts.lock();

        if counts.barriers > 0 && counts.barriers == counts.waiters.len() as u64 {
            std::mem::take(&mut counts.waiters)
        } else {
            HashSet::new()
        }
    }

    /// Remove those of `waiters` that are registered here, returning them
    pub fn clear_waiters(&self, waiters: &HashSet<BarrierIdentity>) -> HashSet<BarrierIdentity> {
        let mut counts = self.counts.lock();
        waiters
            .iter()
            .filter(|w| counts.waiters.remove(*w))
            .cloned()
            .collect()
    }

    /// Current barrier count and waiters, or `None` if retired
    pub fn pending(&self) -> Option<(u64, Vec<BarrierIdentity>)> {
        let counts = self.counts.lock();
        if counts.retired {
            None
        } else {
            Some((counts.barriers, counts.waiters.iter().cloned().collect()))
        }
    }

    /// Notify listeners of a release. Empty releases are not reported.
    pub fn fire_awaken(&self, waiters: &HashSet<BarrierIdentity>) {
        if waiters.is_empty() {
            return;
        }

        tracing::debug!(group = %self.name, waiters = waiters.len(), "Barrier released");
        self.listeners.awaken(waiters);
    }

    /// Snapshot of the counts
    pub fn status(&self) -> GroupStatus {
        let counts = self.counts.lock();
        if counts.retired {
            GroupStatus::Retired
        } else {
            GroupStatus::Active {
                barriers: counts.barriers,
                waiters: counts.waiters.len(),
            }
        }
    }
}

impl fmt::Display for GroupCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.counts.lock();

        if counts.retired {
            return write!(f, "(cancelled)");
        }

        let mut waiters: Vec<_> = counts.waiters.iter().collect();
        waiters.sort();
        let waiters: Vec<String> = waiters.iter().map(|w| w.to_string()).collect();

        write!(f, "({} [{}])", counts.barriers, waiters.join(", "))
    }
}

impl fmt::Debug for GroupCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCore")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("listeners", &self.listeners)
            .finish()
    }
}
