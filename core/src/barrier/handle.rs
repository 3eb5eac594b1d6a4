//! The script-facing barrier handle

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::{BarrierError, BarrierResult};
use crate::group::{BarrierGroup, ListenerId};
use crate::identity::{BarrierIdentity, IdentityGenerator};

/// Where a [`Barrier`] is in its wait cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Not waiting. The initial state, re-entered after every release.
    Idle,
    /// A task is waiting for the group to be released
    Waiting,
    /// Terminal
    Cancelled,
}

#[derive(Debug, Clone)]
struct Slot {
    state: BarrierState,
    identity: Option<BarrierIdentity>,
}

impl Slot {
    fn is_waiting_as(&self, identity: &BarrierIdentity) -> bool {
        self.state == BarrierState::Waiting && self.identity.as_ref() == Some(identity)
    }
}

/// One task's membership of a named barrier group.
///
/// A live `Barrier` contributes one barrier to its group. [`wait`](Self::wait)
/// suspends until every barrier in the group has a waiter, at which point all
/// waiters are released together. Dropping the handle cancels it.
pub struct Barrier {
    group: Arc<dyn BarrierGroup>,
    identities: Arc<IdentityGenerator>,
    listener: ListenerId,
    slot: Arc<watch::Sender<Slot>>,

    // Serialises wait entry, self-cancellation and cancel. Never taken by the
    // release listener.
    ops: Mutex<()>,
}

impl Barrier {
    /// Join `group`, adding one barrier to it.
    pub fn new(
        group: Arc<dyn BarrierGroup>,
        identities: Arc<IdentityGenerator>,
    ) -> BarrierResult<Self> {
        let (slot, _) = watch::channel(Slot {
            state: BarrierState::Idle,
            identity: None,
        });
        let slot = Arc::new(slot);

        let awakened = Arc::clone(&slot);
        let listener = group.add_listener(Arc::new(move |waiters: &HashSet<BarrierIdentity>| {
            awakened.send_if_modified(|slot| {
                let released = slot.state == BarrierState::Waiting
                    && slot.identity.as_ref().is_some_and(|id| waiters.contains(id));
                if released {
                    slot.state = BarrierState::Idle;
                }
                released
            });
        }));

        if let Err(e) = group.add_barrier() {
            group.remove_listener(listener);
            return Err(e);
        }

        Ok(Self {
            group,
            identities,
            listener,
            slot,
            ops: Mutex::new(()),
        })
    }

    /// Name of the barrier group
    pub fn name(&self) -> &str {
        self.group.name()
    }

    /// Current state
    pub fn state(&self) -> BarrierState {
        self.slot.borrow().state
    }

    /// Wait until the group is released.
    ///
    /// # Errors
    ///
    /// `Caller` if another task is already waiting on this handle,
    /// `CancelledBarrier` if the handle is or becomes cancelled, or any error
    /// the group raises while registering the waiter.
    pub async fn wait(&self) -> BarrierResult<()> {
        let guard = self.begin_wait()?;
        let result = self.released(&guard.identity).await;
        guard.disarm();
        result
    }

    /// Wait until the group is released or `timeout` expires.
    ///
    /// Returns `Ok(false)` on expiry, after cancelling the barrier.
    pub async fn wait_timeout(&self, timeout: Duration) -> BarrierResult<bool> {
        let guard = self.begin_wait()?;

        let result = match tokio::time::timeout(timeout, self.released(&guard.identity)).await {
            Ok(result) => result.map(|()| true),
            Err(_) => {
                tracing::debug!(group = self.name(), identity = %guard.identity, "Barrier wait timed out");
                self.abandon(&guard.identity)
            }
        };

        guard.disarm();
        result
    }

    /// Wait until the group is released or `interrupt` fires.
    ///
    /// An interrupt cancels the barrier and returns `Interrupted`, even if the
    /// release arrived at the same time.
    pub async fn wait_interruptibly(
        &self,
        interrupt: &mut broadcast::Receiver<()>,
    ) -> BarrierResult<()> {
        let guard = self.begin_wait()?;

        let result = tokio::select! {
            biased;

            result = self.released(&guard.identity) => result,

            _ = interrupted(interrupt) => {
                tracing::debug!(group = self.name(), identity = %guard.identity, "Barrier wait interrupted");
                if let Err(e) = self.cancel() {
                    tracing::warn!(group = self.name(), error = %e, "Failed to cancel interrupted barrier");
                }
                Err(BarrierError::Interrupted(self.name().to_string()))
            }
        };

        guard.disarm();
        result
    }

    /// Leave the group. Idempotent.
    pub fn cancel(&self) -> BarrierResult<()> {
        let _ops = self.ops.lock();
        self.cancel_locked()
    }

    fn begin_wait(&self) -> BarrierResult<WaitGuard<'_>> {
        let _ops = self.ops.lock();

        match self.state() {
            BarrierState::Idle => {}
            BarrierState::Waiting => {
                return Err(BarrierError::caller(format!(
                    "another task is waiting on '{}'",
                    self.name()
                )))
            }
            BarrierState::Cancelled => return Err(self.cancelled()),
        }

        let identity = self.identities.next();

        // Local groups release synchronously inside add_waiter, so the slot
        // has to show the new identity first.
        self.slot.send_modify(|slot| {
            slot.state = BarrierState::Waiting;
            slot.identity = Some(identity.clone());
        });

        if let Err(e) = self.group.add_waiter(identity.clone()) {
            self.slot.send_modify(|slot| slot.state = BarrierState::Idle);
            return Err(e);
        }

        tracing::trace!(group = self.name(), identity = %identity, "Waiting on barrier");

        Ok(WaitGuard {
            barrier: self,
            identity,
            armed: true,
        })
    }

    async fn released(&self, identity: &BarrierIdentity) -> BarrierResult<()> {
        let mut rx = self.slot.subscribe();

        let state = match rx.wait_for(|slot| !slot.is_waiting_as(identity)).await {
            Ok(slot) => slot.state,
            Err(_) => BarrierState::Cancelled,
        };

        match state {
            BarrierState::Cancelled => Err(self.cancelled()),
            _ => Ok(()),
        }
    }

    /// Stop waiting as `identity`, cancelling the barrier if the wait is still
    /// pending. Returns whether the release happened first.
    fn abandon(&self, identity: &BarrierIdentity) -> BarrierResult<bool> {
        let _ops = self.ops.lock();
        let slot = self.slot.borrow().clone();

        if slot.is_waiting_as(identity) {
            self.cancel_locked()?;
            return Ok(false);
        }

        match slot.state {
            BarrierState::Cancelled => Err(self.cancelled()),
            _ => Ok(true),
        }
    }

    fn cancel_locked(&self) -> BarrierResult<()> {
        let previous = self.slot.borrow().clone();

        if previous.state == BarrierState::Cancelled {
            return Ok(());
        }

        self.group.remove_listener(self.listener);
        self.slot.send_modify(|slot| slot.state = BarrierState::Cancelled);

        // The state is already terminal, so the barrier unit is given back
        // even when the waiter cancel fails.
        let cancelled = match (&previous.state, &previous.identity) {
            (BarrierState::Waiting, Some(identity)) => self.group.cancel_waiter(identity),
            _ => Ok(()),
        };
        let removed = self.group.remove_barriers(1);

        tracing::debug!(group = self.name(), "Barrier cancelled");
        cancelled.and(removed)
    }

    fn cancelled(&self) -> BarrierError {
        BarrierError::CancelledBarrier(self.name().to_string())
    }
}

/// Resolves when `interrupt` fires. A closed channel never fires.
async fn interrupted(interrupt: &mut broadcast::Receiver<()>) {
    loop {
        match interrupt.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

impl Drop for Barrier {
    fn drop(&mut self) {
        if let Err(e) = self.cancel() {
            tracing::warn!(group = self.name(), error = %e, "Failed to cancel dropped barrier");
        }
    }
}

impl std::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier")
            .field("group", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Cancels the barrier if a wait future is dropped before it completes
struct WaitGuard<'a> {
    barrier: &'a Barrier,
    identity: BarrierIdentity,
    armed: bool,
}

impl WaitGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if let Err(e) = self.barrier.abandon(&self.identity) {
            if !matches!(e, BarrierError::CancelledBarrier(_)) {
                tracing::warn!(
                    group = self.barrier.name(),
                    identity = %self.identity,
                    error = %e,
                    "Failed to cancel abandoned wait"
                );
            }
        }
    }
}
