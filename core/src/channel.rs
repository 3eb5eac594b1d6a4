//! Channel configuration for the simulated cluster

/// Channel buffer configuration for cluster communication
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Liveness feed buffer size (cluster -> console), in report batches
    pub liveness_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            liveness_buffer: 16,
        }
    }
}

impl ChannelConfig {
    /// Create a new channel config with a custom liveness buffer size
    pub fn with_liveness_buffer(mut self, size: usize) -> Self {
        self.liveness_buffer = size;
        self
    }
}
