//! Group statistics

use std::time::{Duration, Instant};

/// Counters maintained by a group's broadcast path
#[derive(Debug, Clone)]
pub struct GroupStats {
    /// When the group was created
    pub created_at: Instant,
    /// Messages received from the source
    pub messages_in: u64,
    /// Payload bytes received from the source
    pub bytes_in: u64,
    /// Writes handed to subscriber sinks
    pub chunk_writes: u64,
    /// Bytes handed to subscriber sinks
    pub bytes_out: u64,
    /// Subscribers that received the cached header bootstrap
    pub bootstraps: u64,
    /// Per-subscriber video messages held back while waiting for a key frame
    pub gated_video: u64,
}

impl GroupStats {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            messages_in: 0,
            bytes_in: 0,
            chunk_writes: 0,
            bytes_out: 0,
            bootstraps: 0,
            gated_video: 0,
        }
    }

    /// Time since the group was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Inbound bitrate in bits per second over the group's lifetime
    pub fn inbound_bitrate(&self) -> u64 {
        let secs = self.age().as_secs();
        if secs > 0 {
            (self.bytes_in * 8) / secs
        } else {
            0
        }
    }

    pub(crate) fn record_in(&mut self, len: usize) {
        self.messages_in += 1;
        self.bytes_in += len as u64;
    }

    pub(crate) fn record_write(&mut self, len: usize) {
        self.chunk_writes += 1;
        self.bytes_out += len as u64;
    }
}

impl Default for GroupStats {
    fn default() -> Self {
        Self::new()
    }
}
