//! Simulated cluster for exercising barriers end to end
//!
//! The Cluster stands up everything a distributed test run needs inside one
//! tokio runtime:
//! - A console authority fed by an in-process transport and a liveness feed
//! - One replica registry and message pump per worker process
//! - Script tasks that rendezvous on shared barriers every round
//! - Graceful shutdown via broadcast channels
//!
//! In local mode the console is left out and every process shares one local
//! registry.
//!
//! # Example
//!
//! ```ignore
//! use loadsync_core::cluster::ClusterBuilder;
//!
//! let cluster = ClusterBuilder::new()
//!     .processes(3)
//!     .threads_per_process(5)
//!     .rounds(3)
//!     .build()?;
//!
//! let stats = cluster.run_with_signal_handling().await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_task_stats, AggregatedStats};
pub use builder::ClusterBuilder;
pub use executor::Cluster;
