//! Simulation configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How worker processes share barrier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Each process keeps replicas; the console decides releases
    #[default]
    Distributed,

    /// All processes share one local registry, with no console
    Local,
}

/// Simulation configuration
///
/// Describes the population of worker processes and script tasks that run the
/// increment / assert / reset rounds against shared barriers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of worker processes
    pub processes: usize,

    /// Script tasks per worker process
    pub threads_per_process: usize,

    /// Rounds each task runs
    pub rounds: usize,

    /// Optional bound on every barrier wait, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,

    /// Barrier state sharing
    pub mode: SyncMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            processes: 3,
            threads_per_process: 5,
            rounds: 3,
            wait_timeout_ms: None,
            mode: SyncMode::Distributed,
        }
    }
}

impl SimulationConfig {
    /// Create a config with the given population
    pub fn new(processes: usize, threads_per_process: usize) -> Self {
        Self {
            processes,
            threads_per_process,
            ..Default::default()
        }
    }

    /// Set the number of rounds
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Bound every barrier wait
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = Some(timeout_millis(timeout));
        self
    }

    /// Set the sharing mode
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Total number of script tasks
    pub fn total_tasks(&self) -> usize {
        self.processes * self.threads_per_process
    }

    /// The barrier wait bound, if any
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes == 0 {
            return Err(ConfigError::InvalidProcesses(
                "at least one worker process is required".into(),
            ));
        }

        if self.threads_per_process == 0 {
            return Err(ConfigError::InvalidThreads(
                "each process needs at least one task".into(),
            ));
        }

        if self.rounds == 0 {
            return Err(ConfigError::InvalidRounds(
                "rounds must be at least 1".into(),
            ));
        }

        if self.wait_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidWaitTimeout(
                "wait timeout must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Whole milliseconds for a wait bound. Any non-zero bound is at least 1ms.
pub(crate) fn timeout_millis(timeout: Duration) -> u64 {
    if timeout.is_zero() {
        return 0;
    }
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid process count
    #[error("Invalid process count: {0}")]
    InvalidProcesses(String),

    /// Invalid tasks per process
    #[error("Invalid threads per process: {0}")]
    InvalidThreads(String),

    /// Invalid round count
    #[error("Invalid rounds: {0}")]
    InvalidRounds(String),

    /// Invalid wait timeout
    #[error("Invalid wait timeout: {0}")]
    InvalidWaitTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.processes, 3);
        assert_eq!(config.threads_per_process, 5);
        assert_eq!(config.rounds, 3);
        assert_eq!(config.total_tasks(), 15);
        assert!(config.wait_timeout().is_none());
        assert_eq!(config.mode, SyncMode::Distributed);
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = SimulationConfig::new(2, 4)
            .with_rounds(10)
            .with_wait_timeout(Duration::from_secs(5))
            .with_mode(SyncMode::Local);

        assert_eq!(config.total_tasks(), 8);
        assert_eq!(config.rounds, 10);
        assert_eq!(config.wait_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.mode, SyncMode::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_processes() {
        let config = SimulationConfig::new(0, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProcesses(_))
        ));
    }

    #[test]
    fn test_config_validation_zero_threads() {
        let config = SimulationConfig::new(1, 0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreads(_))));
    }

    #[test]
    fn test_config_validation_zero_rounds() {
        let config = SimulationConfig::new(1, 1).with_rounds(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRounds(_))));
    }

    #[test]
    fn test_sub_millisecond_timeout_rounds_up() {
        let config = SimulationConfig::new(1, 1).with_wait_timeout(Duration::from_micros(300));

        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(1)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let config = SimulationConfig::new(1, 1).with_wait_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWaitTimeout(_))
        ));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"processes": 2, "mode": "local"}"#).unwrap();

        assert_eq!(config.processes, 2);
        assert_eq!(config.threads_per_process, 5);
        assert_eq!(config.mode, SyncMode::Local);
    }

    #[test]
    fn test_config_serialization() {
        let config = SimulationConfig::new(4, 2);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mode\":\"distributed\""));
        assert!(!json.contains("wait_timeout_ms"));

        let deserialized: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.processes, 4);
    }
}
