//! Builder pattern for Cluster construction

use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::config::{timeout_millis, SimulationConfig, SyncMode};
use crate::error::{BarrierError, BarrierResult};

use super::executor::Cluster;

/// Builder for creating a Cluster with proper configuration
///
/// # Example
///
/// ```ignore
/// let cluster = ClusterBuilder::new()
///     .processes(3)
///     .threads_per_process(5)
///     .rounds(3)
///     .mode(SyncMode::Distributed)
///     .build()?;
/// ```
pub struct ClusterBuilder {
    config: SimulationConfig,
    channel_config: ChannelConfig,
}

impl ClusterBuilder {
    /// Create a new cluster builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SimulationConfig::default(),
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the full simulation configuration
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of worker processes
    pub fn processes(mut self, processes: usize) -> Self {
        self.config.processes = processes;
        self
    }

    /// Set the number of script tasks per process
    pub fn threads_per_process(mut self, threads: usize) -> Self {
        self.config.threads_per_process = threads;
        self
    }

    /// Set the number of rounds
    pub fn rounds(mut self, rounds: usize) -> Self {
        self.config.rounds = rounds;
        self
    }

    /// Bound every barrier wait
    pub fn wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.wait_timeout_ms = timeout.map(timeout_millis);
        self
    }

    /// Set how processes share barrier state
    pub fn mode(mut self, mode: SyncMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the cluster
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn build(self) -> BarrierResult<Cluster> {
        self.config
            .validate()
            .map_err(|e| BarrierError::config(e.to_string()))?;

        if self.channel_config.liveness_buffer == 0 {
            return Err(BarrierError::config("liveness buffer must be at least 1"));
        }

        Ok(Cluster::new(self.config, self.channel_config))
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
