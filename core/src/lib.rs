//! loadsync-core: distributed barrier synchronisation for load-generation runs
//!
//! A console drives many worker processes; script tasks in those processes
//! rendezvous on named barriers. This crate provides:
//!
//! - Barrier groups and the registries that hold them (local, replica)
//! - The console authority that decides releases and cleans up after lost workers
//! - The script-facing [`Barrier`] handle
//! - The wire messages and an in-process transport
//! - A simulated cluster that exercises all of the above

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod channel;
pub mod cluster;
pub mod config;
pub mod console;
pub mod error;
pub mod group;
pub mod identity;
pub mod liveness;
pub mod messages;
pub mod registry;
pub mod task;
pub mod transport;

pub use barrier::{Barrier, BarrierState, ScriptBarriers};
pub use channel::ChannelConfig;
pub use cluster::{aggregate_task_stats, AggregatedStats, Cluster, ClusterBuilder};
pub use config::{ConfigError, SimulationConfig, SyncMode};
pub use console::ConsoleAuthority;
pub use error::*;
pub use group::{BarrierGroup, GroupListener, GroupStatus, ListenerId};
pub use identity::{AgentIdentity, BarrierIdentity, IdentityGenerator, WorkerIdentity};
pub use liveness::{ProcessReport, ProcessState};
pub use messages::{AddressedMessage, BarrierMessage};
pub use registry::{BarrierGroups, LocalGroups, ReplicaGroups};
pub use task::{ScriptTask, ScriptTaskBuilder, TaskStats};
pub use transport::MessageSender;
