//! Console-side message handling and cleanup

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::error::{BarrierError, BarrierResult};
use crate::group::BarrierGroup;
use crate::identity::WorkerIdentity;
use crate::liveness::{live_workers, ProcessReport};
use crate::messages::{AddressedMessage, BarrierMessage};
use crate::registry::{BarrierGroups, LocalGroups};
use crate::transport::MessageSender;

use super::process::ProcessGroups;

/// The console's authoritative barrier state.
///
/// Applies the mutations every worker process sends, releases groups, and
/// cancels the contribution of workers that stop appearing in the liveness
/// feed.
pub struct ConsoleAuthority {
    groups: Arc<dyn BarrierGroups>,

    // Per-worker contributions, created on the first message from a worker.
    processes: Mutex<HashMap<WorkerIdentity, Arc<ProcessGroups>>>,
}

impl ConsoleAuthority {
    /// Create an authority whose releases are broadcast through `broadcaster`
    pub fn new(broadcaster: Arc<dyn MessageSender>) -> Self {
        Self::with_groups(Arc::new(LocalGroups::broadcasting(broadcaster)))
    }

    /// Create an authority over an existing set of console groups
    pub fn with_groups(groups: Arc<dyn BarrierGroups>) -> Self {
        Self {
            groups,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// The console's groups
    pub fn groups(&self) -> &Arc<dyn BarrierGroups> {
        &self.groups
    }

    /// Workers the console currently tracks barriers for
    pub fn known_workers(&self) -> Vec<WorkerIdentity> {
        let mut workers: Vec<_> = self.processes.lock().keys().cloned().collect();
        workers.sort();
        workers
    }

    fn process_groups(&self, worker: &WorkerIdentity) -> Arc<ProcessGroups> {
        let mut processes = self.processes.lock();

        if let Some(existing) = processes.get(worker) {
            return Arc::clone(existing);
        }

        let groups = Arc::new(ProcessGroups::new(Arc::clone(&self.groups)));
        processes.insert(worker.clone(), Arc::clone(&groups));
        groups
    }

    /// Apply a message sent by `worker`
    pub fn handle(&self, worker: &WorkerIdentity, message: BarrierMessage) -> BarrierResult<()> {
        tracing::debug!(
            worker = %worker,
            group = message.group_name(),
            kind = message.kind(),
            "Barrier message"
        );

        if let BarrierMessage::OpenBarrier { name, .. } = &message {
            return Err(BarrierError::UnexpectedMessage(format!(
                "open_barrier for '{name}' sent to the console by {worker}"
            )));
        }

        let groups = self.process_groups(worker);

        match message {
            BarrierMessage::AddBarrier { name } => groups.group(&name).add_barrier(),
            BarrierMessage::RemoveBarriers { name, count } => match groups.existing_group(&name) {
                Some(group) => group.remove_barriers(count),
                None => Err(BarrierError::caller(format!(
                    "{worker} removed {count} barriers from '{name}' without adding any"
                ))),
            },
            BarrierMessage::AddWaiter { name, identity } => {
                groups.group(&name).add_waiter(identity)
            }
            // A worker with no share of the group has no waiter to cancel.
            BarrierMessage::CancelWaiter { name, identity } => match groups.existing_group(&name) {
                Some(group) => group.cancel_waiter(&identity),
                None => {
                    tracing::debug!(worker = %worker, group = %name, identity = %identity, "Cancel for unknown group ignored");
                    Ok(())
                }
            },
            // Rejected above.
            BarrierMessage::OpenBarrier { .. } => Ok(()),
        }
    }

    /// Decode and apply a frame from a worker
    pub fn handle_frame(&self, frame: &str) -> BarrierResult<()> {
        let AddressedMessage { address, message } = AddressedMessage::decode(frame)?;
        self.handle(&address, message)
    }

    /// Cancel the contribution of every worker that is no longer alive.
    ///
    /// A failure here means the per-worker bookkeeping no longer matches the
    /// console groups, and is reported as an invariant violation.
    pub fn process_status_update(&self, reports: &[ProcessReport]) -> BarrierResult<()> {
        let live = live_workers(reports);

        let lost: Vec<(WorkerIdentity, Arc<ProcessGroups>)> = {
            let mut processes = self.processes.lock();
            let gone: Vec<WorkerIdentity> = processes
                .keys()
                .filter(|w| !live.contains(*w))
                .cloned()
                .collect();

            gone.into_iter()
                .filter_map(|w| processes.remove(&w).map(|g| (w, g)))
                .collect()
        };

        for (worker, groups) in lost {
            tracing::info!(
                worker = %worker,
                groups = groups.len(),
                "Worker lost, cancelling its barriers"
            );

            groups.cancel_all().map_err(|e| {
                BarrierError::invariant(format!(
                    "failed to cancel barriers of lost worker {worker}: {e}"
                ))
            })?;
        }

        Ok(())
    }

    /// Serve until the inbound channel closes or a shutdown signal arrives.
    ///
    /// Frames are applied in arrival order. Errors from individual messages are
    /// logged; a fatal error stops the loop and is returned.
    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<String>,
        mut status: mpsc::Receiver<Vec<ProcessReport>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> BarrierResult<()> {
        let mut status_open = true;

        tracing::info!("Console barrier authority started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!("Console authority received shutdown signal");
                    break;
                }

                reports = status.recv(), if status_open => {
                    match reports {
                        Some(reports) => {
                            if let Err(e) = self.process_status_update(&reports) {
                                tracing::error!(error = %e, "Barrier cleanup failed");
                                return Err(e);
                            }
                        }
                        None => status_open = false,
                    }
                }

                frame = inbound.recv() => {
                    let Some(frame) = frame else {
                        tracing::debug!("All workers disconnected, console authority stopping");
                        break;
                    };

                    match self.handle_frame(&frame) {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            tracing::error!(error = %e, "Fatal barrier error");
                            return Err(e);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Barrier message rejected");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ConsoleAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleAuthority")
            .field("workers", &self.known_workers())
            .finish()
    }
}

