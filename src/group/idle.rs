//! Idle/liveness policy driven by the group loop

/// Point-in-time view of a group handed to the idle policy on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub source_attached: bool,
    pub subscriber_count: usize,
}

impl GroupSnapshot {
    /// No source and no subscribers
    pub fn is_total_empty(&self) -> bool {
        !self.source_attached && self.subscriber_count == 0
    }
}

/// Decision of an idle policy for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    Keep,
    Evict,
}

/// Why the group loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// `dispose()` was called
    Disposed,
    /// The idle policy asked for the group to be reclaimed
    Idle,
}

/// Strategy deciding when an idle group should be dropped by its registry
pub trait IdlePolicy: Send {
    fn on_tick(&mut self, snapshot: &GroupSnapshot) -> IdleVerdict;
}

/// Keep the group until it is disposed
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl IdlePolicy for NeverEvict {
    fn on_tick(&mut self, _snapshot: &GroupSnapshot) -> IdleVerdict {
        IdleVerdict::Keep
    }
}

/// Evict after a number of consecutive totally-empty ticks
#[derive(Debug, Clone)]
pub struct EvictAfterIdleTicks {
    limit: u32,
    empty_ticks: u32,
}

impl EvictAfterIdleTicks {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            empty_ticks: 0,
        }
    }

    /// Consecutive empty ticks seen so far
    pub fn empty_ticks(&self) -> u32 {
        self.empty_ticks
    }
}

impl IdlePolicy for EvictAfterIdleTicks {
    fn on_tick(&mut self, snapshot: &GroupSnapshot) -> IdleVerdict {
        if !snapshot.is_total_empty() {
            self.empty_ticks = 0;
            return IdleVerdict::Keep;
        }

        self.empty_ticks = self.empty_ticks.saturating_add(1);
        if self.empty_ticks >= self.limit {
            IdleVerdict::Evict
        } else {
            IdleVerdict::Keep
        }
    }
}
