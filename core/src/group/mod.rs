//! Barrier groups
//!
//! A barrier group is the named counting state that barrier handles contribute
//! to: `N` barriers and up to `N` waiters. When every barrier has a waiter the
//! group is *released*: the waiters are drained and reported to the group's
//! listeners together.
//!
//! There are three flavours, created by their registries:
//!
//! - local groups (see [`crate::registry::LocalGroups`]) decide release themselves
//! - replica groups (see [`crate::registry::ReplicaGroups`]) check their own
//!   bookkeeping, forward every mutation to the console, and are released by
//!   `OpenBarrier` messages
//! - process groups (see [`crate::console`]) track one worker's share of an
//!   authoritative console group

mod listeners;
mod state;

pub use listeners::{GroupListener, ListenerId, Listeners};
pub use state::GroupCore;
pub(crate) use state::RetireHook;

use std::sync::Arc;

use crate::error::BarrierResult;
use crate::identity::BarrierIdentity;

/// A named barrier group
pub trait BarrierGroup: Send + Sync {
    /// Group name
    fn name(&self) -> &str;

    /// Register a listener to be told about releases
    fn add_listener(&self, listener: Arc<dyn GroupListener>) -> ListenerId;

    /// Remove a listener
    fn remove_listener(&self, id: ListenerId);

    /// Increase the number of barriers.
    ///
    /// Fails with `InvalidGroup` if all barriers have previously been removed.
    fn add_barrier(&self) -> BarrierResult<()>;

    /// Decrease the number of barriers by `n`.
    ///
    /// Fails with a caller error if `n` is more than the barriers not claimed by
    /// waiters. Removing the last barrier retires the group.
    fn remove_barriers(&self, n: u64) -> BarrierResult<()>;

    /// Add a waiter.
    ///
    /// Fails with a caller error if there are no barriers or the group is
    /// retired, and with an invariant violation if every barrier already has a
    /// waiter.
    fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()>;

    /// Cancel a waiter. Does nothing if the waiter is unknown, which covers
    /// cancels that race a release and cancels with no preceding `add_waiter`.
    fn cancel_waiter(&self, identity: &BarrierIdentity) -> BarrierResult<()>;

    /// Cancel every waiter, then remove every barrier
    fn cancel_all(&self) -> BarrierResult<()>;

    /// Snapshot of the group's counts
    fn status(&self) -> GroupStatus;
}

/// Snapshot of a group's counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// The group is usable
    Active {
        /// Number of barriers
        barriers: u64,
        /// Number of waiters
        waiters: usize,
    },
    /// All barriers were removed; the group can't be used again
    Retired,
}

impl GroupStatus {
    /// Number of barriers (0 once retired)
    pub fn barriers(&self) -> u64 {
        match self {
            GroupStatus::Active { barriers, .. } => *barriers,
            GroupStatus::Retired => 0,
        }
    }

    /// Number of waiters (0 once retired)
    pub fn waiters(&self) -> usize {
        match self {
            GroupStatus::Active { waiters, .. } => *waiters,
            GroupStatus::Retired => 0,
        }
    }

    /// Whether the group is retired
    pub fn is_retired(&self) -> bool {
        matches!(self, GroupStatus::Retired)
    }
}

/// `cancel_all` in terms of a flavour's own `cancel_waiter` and
/// `remove_barriers`, so that replica groups forward each step.
pub(crate) fn cancel_all_via<G>(group: &G, core: &GroupCore) -> BarrierResult<()>
where
    G: BarrierGroup + ?Sized,
{
    let Some((barriers, waiters)) = core.pending() else {
        return Ok(());
    };

    for identity in &waiters {
        group.cancel_waiter(identity)?;
    }

    group.remove_barriers(barriers)
}
