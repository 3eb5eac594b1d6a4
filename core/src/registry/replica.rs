//! Worker-side replicas of console barrier groups

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::error::{BarrierError, BarrierResult};
use crate::group::{cancel_all_via, BarrierGroup, GroupCore, GroupListener, GroupStatus, ListenerId};
use crate::identity::BarrierIdentity;
use crate::messages::BarrierMessage;
use crate::transport::MessageSender;

use super::{BarrierGroups, GroupRegistry, RegisteredGroup};

/// Barrier groups of a worker process connected to a console.
///
/// Each mutation is checked against this process's share of the group, then sent
/// to the console. The console alone decides when a group is released and tells
/// every agent with an `OpenBarrier` message, which is delivered to
/// [`ReplicaGroups::handle`].
pub struct ReplicaGroups {
    registry: GroupRegistry<ReplicaGroup>,
    sender: Arc<dyn MessageSender>,
}

impl ReplicaGroups {
    /// Create replica groups that forward mutations through `sender`
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            registry: GroupRegistry::new(),
            sender,
        }
    }

    /// Return the group called `name`, creating it if necessary
    pub fn group(&self, name: &str) -> Arc<ReplicaGroup> {
        self.registry.get_or_create(name, |core| ReplicaGroup {
            core,
            sender: Arc::clone(&self.sender),
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

    /// Release the local waiters the console has released.
    ///
    /// Messages for groups this process doesn't know are dropped, and identities
    /// that are no longer waiting here are ignored.
    pub fn open_barrier(&self, name: &str, waiters: &HashSet<BarrierIdentity>) {
        let Some(group) = self.registry.existing(name) else {
            tracing::trace!(group = name, "Ignoring release for unknown group");
            return;
        };

        let released = group.core.clear_waiters(waiters);
        group.core.fire_awaken(&released);
    }

    /// Handle a message from the console
    pub fn handle(&self, message: BarrierMessage) -> BarrierResult<()> {
        match message {
            BarrierMessage::OpenBarrier { name, waiters } => {
                self.open_barrier(&name, &waiters);
                Ok(())
            }
            other => Err(BarrierError::UnexpectedMessage(format!(
                "{} for '{}' sent to a worker",
                other.kind(),
                other.group_name()
            ))),
        }
    }

    /// Decode and handle a frame from the console
    pub fn handle_frame(&self, frame: &str) -> BarrierResult<()> {
        self.handle(BarrierMessage::decode(frame)?)
    }

    /// Message pump: handle frames from the console until the channel closes or
    /// a shutdown signal arrives.
    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<String>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> BarrierResult<()> {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!("Replica message pump received shutdown signal");
                    break;
                }

                frame = inbound.recv() => {
                    let Some(frame) = frame else {
                        tracing::debug!("Console channel closed, replica message pump stopping");
                        break;
                    };

                    if let Err(e) = self.handle_frame(&frame) {
                        tracing::warn!(error = %e, "Dropping message from console");
                    }
                }
            }
        }

        Ok(())
    }
}

impl BarrierGroups for ReplicaGroups {
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

impl fmt::Display for ReplicaGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaGroups{}", self.registry)
    }
}

/// This process's view of a console barrier group.
///
/// Never releases waiters by itself.
pub struct ReplicaGroup {
    core: GroupCore,
    sender: Arc<dyn MessageSender>,
}

impl ReplicaGroup {
    fn send(&self, message: BarrierMessage) -> BarrierResult<()> {
        tracing::trace!(group = %self.core.name(), kind = message.kind(), "Forwarding to console");
        self.sender.send(message)
    }
}

impl RegisteredGroup for ReplicaGroup {
    fn core(&self) -> &GroupCore {
        &self.core
    }
}

impl BarrierGroup for ReplicaGroup {
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
        self.send(BarrierMessage::AddBarrier {
            name: self.name().to_string(),
        })
    }

    fn remove_barriers(&self, n: u64) -> BarrierResult<()> {
        self.core.remove_barriers(n)?;
        self.send(BarrierMessage::RemoveBarriers {
            name: self.name().to_string(),
            count: n,
        })
    }

    fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()> {
        self.core.add_waiter(identity.clone())?;
        let sent = self.send(BarrierMessage::AddWaiter {
            name: self.name().to_string(),
            identity: identity.clone(),
        });

        // The console never heard of this waiter.
        if sent.is_err() {
            self.core.cancel_waiter(&identity);
        }
        sent
    }

    fn cancel_waiter(&self, identity: &BarrierIdentity) -> BarrierResult<()> {
        self.core.cancel_waiter(identity);
        self.send(BarrierMessage::CancelWaiter {
            name: self.name().to_string(),
            identity: identity.clone(),
        })
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        cancel_all_via(self, &self.core)
    }

    fn status(&self) -> GroupStatus {
        self.core.status()
    }
}

impl fmt::Display for ReplicaGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.core, f)
    }
}
