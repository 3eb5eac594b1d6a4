//! Listener registration for barrier groups

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::BarrierIdentity;

/// Notified when a barrier group releases its waiters
pub trait GroupListener: Send + Sync {
    /// Called once per release with exactly the identities released
    fn awaken(&self, waiters: &HashSet<BarrierIdentity>);
}

impl<F> GroupListener for F
where
    F: Fn(&HashSet<BarrierIdentity>) + Send + Sync,
{
    fn awaken(&self, waiters: &HashSet<BarrierIdentity>) {
        self(waiters)
    }
}

/// Handle returned by listener registration, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A set of listeners
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn GroupListener>)>>,
}

impl Listeners {
    /// Register a listener
    pub fn add(&self, listener: Arc<dyn GroupListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `awaken` on every listener.
    ///
    /// Listeners are called outside the registration lock, so a listener may
    /// remove itself or register others.
    pub fn awaken(&self, waiters: &HashSet<BarrierIdentity>) {
        let snapshot: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            listener.awaken(waiters);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
