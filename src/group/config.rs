//! Group configuration

use std::time::Duration;

use crate::protocol::constants::*;

/// Per-group configuration options
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Interval of the idle/liveness loop
    pub tick_interval: Duration,

    /// Chunk size used when re-chunking messages for subscribers
    pub chunk_size: u32,

    /// Queue depth of channel-backed subscriber sinks, in chunk writes
    pub subscriber_queue_capacity: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            chunk_size: LOCAL_CHUNK_SIZE,
            subscriber_queue_capacity: 1024,
        }
    }
}

impl GroupConfig {
    /// Set the idle loop interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the outbound chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set the subscriber queue depth (at least 1)
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GroupConfig::default();

        assert_eq!(config.tick_interval, Duration::from_millis(200));
        assert_eq!(config.chunk_size, LOCAL_CHUNK_SIZE);
        assert_eq!(config.subscriber_queue_capacity, 1024);
    }

    #[test]
    fn test_builder_chunk_size_clamped() {
        assert_eq!(GroupConfig::default().chunk_size(8192).chunk_size, 8192);
        assert_eq!(GroupConfig::default().chunk_size(1).chunk_size, MIN_CHUNK_SIZE);
        assert_eq!(
            GroupConfig::default().chunk_size(u32::MAX).chunk_size,
            MAX_CHUNK_SIZE
        );
    }

    #[test]
    fn test_builder_queue_capacity_non_zero() {
        let config = GroupConfig::default().subscriber_queue_capacity(0);

        assert_eq!(config.subscriber_queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = GroupConfig::default()
            .tick_interval(Duration::from_secs(1))
            .chunk_size(60000)
            .subscriber_queue_capacity(64);

        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.chunk_size, 60000);
        assert_eq!(config.subscriber_queue_capacity, 64);
    }
}
