//! In-process messaging transport
//!
//! The barrier core only needs a [`MessageSender`]. The channel-backed
//! implementations here connect worker processes and the console inside one
//! tokio runtime. Messages are encoded to JSON frames on send and decoded by the
//! receiving endpoint, as they would be on a socket.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{BarrierError, BarrierResult};
use crate::identity::WorkerIdentity;
use crate::messages::{AddressedMessage, BarrierMessage};

/// Sends barrier messages to a remote endpoint.
///
/// `send` returns once the message has been handed to the transport.
pub trait MessageSender: Send + Sync {
    /// Send a message
    fn send(&self, message: BarrierMessage) -> BarrierResult<()>;
}

/// Create the console's inbound link.
///
/// Returns the link used to create worker senders, and the receiver the
/// console authority reads frames from.
pub fn console_link() -> (ConsoleLink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConsoleLink { tx }, rx)
}

/// Client side of the console's inbound channel
#[derive(Debug, Clone)]
pub struct ConsoleLink {
    tx: mpsc::UnboundedSender<String>,
}

impl ConsoleLink {
    /// Create a sender for a worker process.
    ///
    /// Every message it sends is stamped with `address`.
    pub fn worker_sender(&self, address: WorkerIdentity) -> WorkerSender {
        WorkerSender {
            address,
            tx: self.tx.clone(),
        }
    }
}

/// Sends a worker process's messages to the console
#[derive(Debug, Clone)]
pub struct WorkerSender {
    address: WorkerIdentity,
    tx: mpsc::UnboundedSender<String>,
}

impl MessageSender for WorkerSender {
    fn send(&self, message: BarrierMessage) -> BarrierResult<()> {
        let frame = AddressedMessage {
            address: self.address.clone(),
            message,
        }
        .encode()?;

        self.tx
            .send(frame)
            .map_err(|_| BarrierError::communication("console connection closed"))
    }
}

/// Sends console messages to every connected agent
#[derive(Debug, Default)]
pub struct AgentBroadcaster {
    agents: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl AgentBroadcaster {
    /// Create a broadcaster with no agents
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connect a new agent, returning the receiver its message pump reads from
    pub fn connect(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.agents.lock().push(tx);
        rx
    }

    /// Number of connected agents
    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }
}

impl MessageSender for AgentBroadcaster {
    fn send(&self, message: BarrierMessage) -> BarrierResult<()> {
        let frame = message.encode()?;
        let mut agents = self.agents.lock();

        agents.retain(|agent| agent.send(frame.clone()).is_ok());

        tracing::debug!(
            group = message.group_name(),
            kind = message.kind(),
            agents = agents.len(),
            "Broadcast to agents"
        );

        Ok(())
    }
}
