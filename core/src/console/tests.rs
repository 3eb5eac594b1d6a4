//! Tests for the console module

use super::authority::ConsoleAuthority;
use crate::error::{BarrierError, BarrierResult};
use crate::group::{BarrierGroup, GroupListener, GroupStatus, ListenerId, Listeners};
use crate::identity::{AgentIdentity, BarrierIdentity, IdentityGenerator, WorkerIdentity};
use crate::liveness::ProcessReport;
use crate::messages::{AddressedMessage, BarrierMessage};
use crate::registry::BarrierGroups;
use crate::transport::AgentBroadcaster;

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Recording groups
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    AddBarrier,
    RemoveBarriers(u64),
    AddWaiter(BarrierIdentity),
    CancelWaiter(BarrierIdentity),
}

/// A console group that records the calls made to it
struct RecordingGroup {
    name: String,
    calls: Mutex<Vec<Call>>,
    listeners: Listeners,
    fail_removal: AtomicBool,
}

impl RecordingGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            listeners: Listeners::default(),
            fail_removal: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

impl BarrierGroup for RecordingGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_listener(&self, listener: Arc<dyn GroupListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn add_barrier(&self) -> BarrierResult<()> {
        self.calls.lock().push(Call::AddBarrier);
        Ok(())
    }

    fn remove_barriers(&self, n: u64) -> BarrierResult<()> {
        if self.fail_removal.load(Ordering::SeqCst) {
            return Err(BarrierError::communication("simulated"));
        }
        self.calls.lock().push(Call::RemoveBarriers(n));
        Ok(())
    }

    fn add_waiter(&self, identity: BarrierIdentity) -> BarrierResult<()> {
        self.calls.lock().push(Call::AddWaiter(identity));
        Ok(())
    }

    fn cancel_waiter(&self, identity: &BarrierIdentity) -> BarrierResult<()> {
        self.calls.lock().push(Call::CancelWaiter(identity.clone()));
        Ok(())
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        Ok(())
    }

    fn status(&self) -> GroupStatus {
        GroupStatus::Active {
            barriers: 0,
            waiters: 0,
        }
    }
}

#[derive(Default)]
struct RecordingGroups {
    groups: Mutex<HashMap<String, Arc<RecordingGroup>>>,
}

impl RecordingGroups {
    fn group(&self, name: &str) -> Arc<RecordingGroup> {
        Arc::clone(
            self.groups
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RecordingGroup::new(name))),
        )
    }
}

impl BarrierGroups for RecordingGroups {
    fn get_group(&self, name: &str) -> Arc<dyn BarrierGroup> {
        self.group(name)
    }

    fn existing_group(&self, name: &str) -> Option<Arc<dyn BarrierGroup>> {
        self.groups
            .lock()
            .get(name)
            .map(|g| Arc::clone(g) as Arc<dyn BarrierGroup>)
    }

    fn cancel_all(&self) -> BarrierResult<()> {
        Ok(())
    }
}

fn add_barrier(name: &str) -> BarrierMessage {
    BarrierMessage::AddBarrier { name: name.into() }
}

fn add_waiter(name: &str, identity: &BarrierIdentity) -> BarrierMessage {
    BarrierMessage::AddWaiter {
        name: name.into(),
        identity: identity.clone(),
    }
}

// ============================================================================
// Message handling
// ============================================================================

#[test]
fn test_message_handlers_apply_to_console_group() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = ConsoleAuthority::with_groups(groups.clone());
    let worker = WorkerIdentity::new("agent", 0);
    let identity = IdentityGenerator::new(worker.clone()).next();

    authority.handle(&worker, add_barrier("hello")).unwrap();
    authority
        .handle(&worker, add_waiter("hello", &identity))
        .unwrap();
    authority
        .handle(
            &worker,
            BarrierMessage::CancelWaiter {
                name: "hello".into(),
                identity: identity.clone(),
            },
        )
        .unwrap();
    authority
        .handle(
            &worker,
            BarrierMessage::RemoveBarriers {
                name: "hello".into(),
                count: 1,
            },
        )
        .unwrap();

    assert_eq!(
        groups.group("hello").calls(),
        vec![
            Call::AddBarrier,
            Call::AddWaiter(identity.clone()),
            Call::CancelWaiter(identity),
            Call::RemoveBarriers(1),
        ]
    );
}

#[test]
fn test_worker_misuse_rejected_before_console_group() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = ConsoleAuthority::with_groups(groups.clone());
    let worker = WorkerIdentity::new("agent", 0);

    // The worker has no barriers in "g" to remove.
    let err = authority
        .handle(
            &worker,
            BarrierMessage::RemoveBarriers {
                name: "g".into(),
                count: 1,
            },
        )
        .unwrap_err();

    assert!(matches!(err, BarrierError::Caller(_)));
    assert!(groups.group("g").calls().is_empty());
}

#[test]
fn test_cancel_for_unknown_group_creates_nothing() {
    let authority = ConsoleAuthority::new(AgentBroadcaster::new());
    let w1 = WorkerIdentity::new("a", 0);
    let w2 = WorkerIdentity::new("b", 0);
    let stray = IdentityGenerator::new(w2.clone()).next();

    authority
        .handle(
            &w2,
            BarrierMessage::CancelWaiter {
                name: "g".into(),
                identity: stray,
            },
        )
        .unwrap();
    assert!(authority.groups().existing_group("g").is_none());

    authority.handle(&w1, add_barrier("g")).unwrap();
    authority
        .handle(
            &w1,
            BarrierMessage::RemoveBarriers {
                name: "g".into(),
                count: 1,
            },
        )
        .unwrap();

    authority.handle(&w2, add_barrier("g")).unwrap();
    assert_eq!(
        authority.groups().get_group("g").status(),
        GroupStatus::Active {
            barriers: 1,
            waiters: 0
        }
    );
}

#[test]
fn test_empty_share_follows_replaced_console_group() {
    let authority = ConsoleAuthority::new(AgentBroadcaster::new());
    let w1 = WorkerIdentity::new("a", 0);
    let w2 = WorkerIdentity::new("b", 0);
    let early = IdentityGenerator::new(w2.clone()).next();

    // Waiting before joining leaves w2 with an empty share of "g".
    let err = authority.handle(&w2, add_waiter("g", &early)).unwrap_err();
    assert!(matches!(err, BarrierError::Caller(_)));

    authority.handle(&w1, add_barrier("g")).unwrap();
    authority
        .handle(
            &w1,
            BarrierMessage::RemoveBarriers {
                name: "g".into(),
                count: 1,
            },
        )
        .unwrap();
    assert!(authority.groups().existing_group("g").is_none());

    authority.handle(&w2, add_barrier("g")).unwrap();
    let joined = IdentityGenerator::new(w1.clone()).next();
    authority.handle(&w1, add_barrier("g")).unwrap();
    authority.handle(&w1, add_waiter("g", &joined)).unwrap();

    assert_eq!(
        authority.groups().get_group("g").status(),
        GroupStatus::Active {
            barriers: 2,
            waiters: 1
        }
    );

    // Both shares are intact, so cleanup leaves nothing behind.
    authority.process_status_update(&[]).unwrap();
    assert!(authority.groups().existing_group("g").is_none());
}

#[test]
fn test_open_barrier_from_worker_is_rejected() {
    let authority = ConsoleAuthority::with_groups(Arc::new(RecordingGroups::default()));

    let err = authority
        .handle(
            &WorkerIdentity::new("agent", 0),
            BarrierMessage::OpenBarrier {
                name: "g".into(),
                waiters: HashSet::new(),
            },
        )
        .unwrap_err();

    assert!(matches!(err, BarrierError::UnexpectedMessage(_)));
    assert!(authority.known_workers().is_empty());
}

// ============================================================================
// Liveness cleanup
// ============================================================================

#[test]
fn test_barriers_clean_up() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = ConsoleAuthority::with_groups(groups.clone());

    let agent = AgentIdentity::new("agent");
    let worker1 = agent.create_worker_identity();
    let worker2 = agent.create_worker_identity();
    let identity = IdentityGenerator::new(worker2.clone()).next();

    authority.handle(&worker1, add_barrier("g1")).unwrap();
    authority.handle(&worker1, add_barrier("g1")).unwrap();
    authority.handle(&worker2, add_barrier("g2")).unwrap();
    authority.handle(&worker2, add_barrier("g1")).unwrap();
    authority
        .handle(&worker2, add_waiter("g1", &identity))
        .unwrap();

    let group1 = groups.group("g1");
    let group2 = groups.group("g2");
    assert_eq!(group1.count(&Call::AddBarrier), 3);
    assert_eq!(group1.count(&Call::AddWaiter(identity.clone())), 1);
    assert_eq!(group2.count(&Call::AddBarrier), 1);
    assert_eq!(authority.known_workers(), vec![worker1.clone(), worker2.clone()]);

    // Worker 1 has gone away.
    authority
        .process_status_update(&[ProcessReport::running(worker2.clone())])
        .unwrap();

    assert_eq!(group1.count(&Call::RemoveBarriers(2)), 1);
    assert_eq!(group1.count(&Call::CancelWaiter(identity.clone())), 0);
    assert_eq!(authority.known_workers(), vec![worker2.clone()]);

    // All workers have gone away.
    authority.process_status_update(&[]).unwrap();

    assert_eq!(group1.count(&Call::CancelWaiter(identity)), 1);
    assert_eq!(group1.count(&Call::RemoveBarriers(1)), 1);
    assert_eq!(group2.count(&Call::RemoveBarriers(1)), 1);
    assert!(authority.known_workers().is_empty());
}

#[test]
fn test_finished_worker_is_cleaned_up() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = ConsoleAuthority::with_groups(groups.clone());
    let worker = WorkerIdentity::new("agent", 0);

    authority.handle(&worker, add_barrier("g")).unwrap();
    authority
        .process_status_update(&[ProcessReport::finished(worker)])
        .unwrap();

    assert_eq!(groups.group("g").count(&Call::RemoveBarriers(1)), 1);
}

#[test]
fn test_barriers_clean_up_failure_is_fatal() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = ConsoleAuthority::with_groups(groups.clone());
    let worker = WorkerIdentity::new("agent", 0);

    authority.handle(&worker, add_barrier("g1")).unwrap();
    groups.group("g1").fail_removal.store(true, Ordering::SeqCst);

    let err = authority.process_status_update(&[]).unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("agent-0"));
}

#[test]
fn test_lost_worker_releases_remaining_waiters() {
    let broadcaster = AgentBroadcaster::new();
    let mut agent_rx = broadcaster.connect();
    let authority = ConsoleAuthority::new(broadcaster);

    let alive = WorkerIdentity::new("agent", 0);
    let lost = WorkerIdentity::new("agent", 1);
    let identity = IdentityGenerator::new(alive.clone()).next();

    authority.handle(&alive, add_barrier("g")).unwrap();
    authority.handle(&lost, add_barrier("g")).unwrap();
    authority.handle(&alive, add_waiter("g", &identity)).unwrap();
    assert!(agent_rx.try_recv().is_err());

    authority
        .process_status_update(&[ProcessReport::running(alive)])
        .unwrap();

    let frame = agent_rx.try_recv().unwrap();
    assert_eq!(
        BarrierMessage::decode(&frame).unwrap(),
        BarrierMessage::OpenBarrier {
            name: "g".into(),
            waiters: [identity].into_iter().collect(),
        }
    );

    let group = authority.groups().existing_group("g").unwrap();
    assert_eq!(
        group.status(),
        GroupStatus::Active {
            barriers: 1,
            waiters: 0
        }
    );
}

#[test]
fn test_release_across_workers() {
    let broadcaster = AgentBroadcaster::new();
    let mut agent_rx = broadcaster.connect();
    let authority = ConsoleAuthority::new(broadcaster);

    let workers = [WorkerIdentity::new("a", 0), WorkerIdentity::new("b", 0)];
    let identities: Vec<_> = workers
        .iter()
        .map(|w| IdentityGenerator::new(w.clone()).next())
        .collect();

    for worker in &workers {
        authority.handle(worker, add_barrier("g")).unwrap();
    }
    for (worker, identity) in workers.iter().zip(&identities) {
        authority.handle(worker, add_waiter("g", identity)).unwrap();
    }

    match BarrierMessage::decode(&agent_rx.try_recv().unwrap()).unwrap() {
        BarrierMessage::OpenBarrier { name, waiters } => {
            assert_eq!(name, "g");
            assert_eq!(waiters, identities.iter().cloned().collect());
        }
        other => panic!("Expected OpenBarrier, got {other:?}"),
    }

    // Released waiters are forgotten by the per-worker records too, so both
    // workers can leave without tripping the cleanup.
    authority.process_status_update(&[]).unwrap();
    assert!(authority.groups().existing_group("g").is_none());
}

// ============================================================================
// Message loop
// ============================================================================

#[tokio::test]
async fn test_run_applies_frames_and_liveness() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = Arc::new(ConsoleAuthority::with_groups(groups.clone()));
    let worker = WorkerIdentity::new("agent", 0);

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::channel(4);
    let (shutdown_tx, _) = broadcast::channel(1);
    let shutdown_rx = shutdown_tx.subscribe();

    let server = Arc::clone(&authority);
    let handle = tokio::spawn(async move { server.run(frame_rx, status_rx, shutdown_rx).await });

    let frame = AddressedMessage {
        address: worker.clone(),
        message: add_barrier("g"),
    }
    .encode()
    .unwrap();
    frame_tx.send(frame).unwrap();
    frame_tx.send("not a frame".to_string()).unwrap();

    // Let the frames be applied before the worker is reported lost.
    while groups.group("g").count(&Call::AddBarrier) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    status_tx.send(Vec::new()).await.unwrap();
    while groups.group("g").count(&Call::RemoveBarriers(1)) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_stops_on_fatal_cleanup_error() {
    let groups = Arc::new(RecordingGroups::default());
    let authority = Arc::new(ConsoleAuthority::with_groups(groups.clone()));
    let worker = WorkerIdentity::new("agent", 0);
    authority.handle(&worker, add_barrier("g")).unwrap();
    groups.group("g").fail_removal.store(true, Ordering::SeqCst);

    let (_frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
    let (status_tx, status_rx) = mpsc::channel(1);
    let (shutdown_tx, _) = broadcast::channel(1);

    status_tx.send(Vec::new()).await.unwrap();
    let err = authority
        .run(frame_rx, status_rx, shutdown_tx.subscribe())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
}

