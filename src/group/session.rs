//! Session handles seen by a group
//!
//! The connection layer owns publisher, puller and subscriber sessions. A
//! group only keeps their identity, and for subscribers a record holding
//! the sink plus the two bootstrap flags. No I/O resource is owned here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

use super::observer::AvMessageObserver;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Downstream end of a subscriber session
pub trait SubscriberSink: Send + Sync {
    /// Identity of the session behind this sink
    fn id(&self) -> SessionId;

    /// Hand already-framed chunk bytes to the session for delivery.
    ///
    /// Must not block. Called with the group lock held, so backpressure and
    /// delivery failures stay inside the sink.
    fn write(&self, data: Bytes);
}

/// Where a subscriber is in its bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Nothing delivered yet; cached headers go out on the next message
    Fresh,
    /// Headers delivered, video held back until an AVC key frame
    WaitingKeyFrame,
    /// Everything is forwarded
    Streaming,
}

/// A subscriber as recorded by a group
pub struct Subscriber {
    sink: Arc<dyn SubscriberSink>,
    pub(crate) is_fresh: bool,
    pub(crate) wait_key_nalu: bool,
}

impl Subscriber {
    /// Record for a newly connected session: fresh and waiting for a key frame
    pub fn new(sink: Arc<dyn SubscriberSink>) -> Self {
        Self::with_flags(sink, true, true)
    }

    /// Record with explicit bootstrap flags
    pub fn with_flags(sink: Arc<dyn SubscriberSink>, is_fresh: bool, wait_key_nalu: bool) -> Self {
        Self {
            sink,
            is_fresh,
            wait_key_nalu,
        }
    }

    /// Skip key-frame gating; video is forwarded right after the cached headers
    pub fn without_key_frame_wait(mut self) -> Self {
        self.wait_key_nalu = false;
        self
    }

    pub fn id(&self) -> SessionId {
        self.sink.id()
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh
    }

    pub fn wait_key_nalu(&self) -> bool {
        self.wait_key_nalu
    }

    pub fn state(&self) -> SubscriberState {
        if self.is_fresh {
            SubscriberState::Fresh
        } else if self.wait_key_nalu {
            SubscriberState::WaitingKeyFrame
        } else {
            SubscriberState::Streaming
        }
    }

    pub(crate) fn write(&self, data: Bytes) {
        self.sink.write(data);
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id())
            .field("is_fresh", &self.is_fresh)
            .field("wait_key_nalu", &self.wait_key_nalu)
            .finish()
    }
}

/// A local publisher session feeding a group
pub trait SourceSession: Send + Sync {
    fn id(&self) -> SessionId;

    /// Route every decoded audio/video/data message to `observer`
    fn set_observer(&self, observer: Arc<dyn AvMessageObserver>);
}

/// A client session pulling a stream from an upstream server
#[async_trait]
pub trait UpstreamPuller: Send {
    fn id(&self) -> SessionId;

    /// Route every decoded audio/video/data message to `observer`
    fn set_observer(&mut self, observer: Arc<dyn AvMessageObserver>);

    /// Handshake, connect and start playing `url`
    async fn connect(&mut self, url: &str) -> Result<()>;

    /// Read until the upstream closes (`Ok`) or fails (`Err`)
    async fn run_until_done(&mut self) -> Result<()>;
}

/// Kind of the source currently attached to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Publisher,
    Puller,
}

/// Source bookkeeping kept by a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedSource {
    pub kind: SourceKind,
    pub id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink(SessionId);

    impl SubscriberSink for NullSink {
        fn id(&self) -> SessionId {
            self.0
        }

        fn write(&self, _data: Bytes) {}
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_subscriber_states() {
        let sink = Arc::new(NullSink(SessionId(7)));

        let sub = Subscriber::new(sink.clone());
        assert_eq!(sub.id(), SessionId(7));
        assert_eq!(sub.state(), SubscriberState::Fresh);

        let sub = Subscriber::with_flags(sink.clone(), false, true);
        assert_eq!(sub.state(), SubscriberState::WaitingKeyFrame);

        let sub = Subscriber::with_flags(sink, false, true).without_key_frame_wait();
        assert_eq!(sub.state(), SubscriberState::Streaming);
    }
}
