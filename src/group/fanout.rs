//! Per-stream fan-out group
//!
//! A group owns the bookkeeping of one stream: the single source, the set
//! of subscriber records and the cached header messages. Every inbound
//! message is re-chunked once and written to each eligible subscriber.
//!
//! ```text
//!   [Publisher | Puller]
//!            │ on_av_message()
//!            ▼
//!   ┌──────────────────────── Mutex ─┐
//!   │ packetize once                 │
//!   │ fresh?   → cached headers      │──► sink.write() ─► subscriber A
//!   │ waiting? → gate on key frame   │──► sink.write() ─► subscriber B
//!   │ else     → forward             │──► sink.write() ─► subscriber C
//!   │ update header cache            │
//!   │ observer.on_av_message()       │
//!   └────────────────────────────────┘
//! ```
//!
//! All state sits behind one lock, so a subscriber always joins against a
//! consistent header cache and every subscriber sees the source's messages
//! in the same order. Sink writes never block; the lock only covers
//! in-memory work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::media::flv::{is_aac_sequence_header, is_avc_key_nalu, is_avc_sequence_header, MediaClass};
use crate::protocol::chunk::{message_to_chunks, MessageHeader};
use crate::protocol::constants::{CSID_AMF, CSID_AUDIO, CSID_VIDEO, MSID1};

use super::config::GroupConfig;
use super::idle::{GroupSnapshot, IdlePolicy, IdleVerdict, LoopExit, NeverEvict};
use super::key::StreamKey;
use super::observer::AvMessageObserver;
use super::session::{
    AttachedSource, SessionId, SourceKind, SourceSession, Subscriber, SubscriberState,
    UpstreamPuller,
};
use super::stats::GroupStats;

/// State guarded by the group lock
struct GroupInner {
    source: Option<AttachedSource>,
    subscribers: HashMap<SessionId, Subscriber>,
    cached_metadata: Option<Bytes>,
    cached_video_header: Option<Bytes>,
    cached_audio_header: Option<Bytes>,
    observer: Option<Arc<dyn AvMessageObserver>>,
    stats: GroupStats,
}

impl GroupInner {
    fn new() -> Self {
        Self {
            source: None,
            subscribers: HashMap::new(),
            cached_metadata: None,
            cached_video_header: None,
            cached_audio_header: None,
            observer: None,
            stats: GroupStats::new(),
        }
    }

    fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            source_attached: self.source.is_some(),
            subscriber_count: self.subscribers.len(),
        }
    }
}

/// Fan-out hub for one stream
pub struct Group {
    key: StreamKey,
    config: GroupConfig,
    inner: Mutex<GroupInner>,
    /// Only touched by the idle loop
    idle_policy: Mutex<Box<dyn IdlePolicy>>,
    shutdown: CancellationToken,
}

impl Group {
    /// Create a group for `app/name` with default configuration
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_config(app, name, GroupConfig::default())
    }

    /// Create a group with custom configuration
    pub fn with_config(app: impl Into<String>, name: impl Into<String>, config: GroupConfig) -> Self {
        let key = StreamKey::new(app, name);
        tracing::debug!(stream = %key, "Group created");

        Self {
            key,
            config,
            inner: Mutex::new(GroupInner::new()),
            idle_policy: Mutex::new(Box::new(NeverEvict)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the idle policy consulted by [`Group::run_loop`]
    pub fn with_idle_policy(self, policy: impl IdlePolicy + 'static) -> Self {
        *self.idle_policy.lock() = Box::new(policy);
        self
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Attach a local publisher as the source.
    ///
    /// The caller must make sure only one source is live; a second attach
    /// silently replaces the first. The group becomes the publisher's
    /// message observer.
    pub fn attach_source(self: &Arc<Self>, source: &dyn SourceSession) {
        let id = source.id();
        tracing::debug!(stream = %self.key, session_id = %id, "Publisher attached");

        let previous = self.inner.lock().source.replace(AttachedSource {
            kind: SourceKind::Publisher,
            id,
        });
        if let Some(prev) = previous.filter(|prev| prev.id != id) {
            tracing::warn!(
                stream = %self.key,
                previous = %prev.id,
                session_id = %id,
                "Source replaced"
            );
        }

        source.set_observer(Arc::clone(self) as Arc<dyn AvMessageObserver>);
    }

    /// Forget the current source, whoever it is
    pub fn detach_source(&self, id: SessionId) {
        tracing::debug!(stream = %self.key, session_id = %id, "Source detached");
        self.inner.lock().source = None;
    }

    /// Pull this stream from `addr` and relay it until the upstream ends.
    ///
    /// Connects to `rtmp://{addr}/{app}/{name}` within `connect_timeout`, then
    /// runs the puller to completion. Whatever the outcome, the puller is no
    /// longer the source when this returns. Disposing the group ends the pull
    /// with [`Error::Disposed`].
    pub async fn pull_from<P>(
        self: &Arc<Self>,
        mut puller: P,
        addr: &str,
        connect_timeout: Duration,
    ) -> Result<()>
    where
        P: UpstreamPuller,
    {
        let id = puller.id();
        let url = self.key.rtmp_url(addr);

        self.inner.lock().source = Some(AttachedSource {
            kind: SourceKind::Puller,
            id,
        });
        puller.set_observer(Arc::clone(self) as Arc<dyn AvMessageObserver>);
        tracing::info!(stream = %self.key, session_id = %id, url = %url, "Pull started");

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::Disposed),
            result = drive_pull(&mut puller, &url, connect_timeout) => result,
        };

        {
            let mut inner = self.inner.lock();
            if inner.source.is_some_and(|source| source.id == id) {
                inner.source = None;
            }
        }

        match &result {
            Ok(()) => {
                tracing::info!(stream = %self.key, session_id = %id, "Pull finished");
            }
            Err(Error::Disposed) => {
                tracing::info!(stream = %self.key, session_id = %id, "Pull stopped, group disposed");
            }
            Err(e @ (Error::Connect(_) | Error::ConnectTimeout { .. })) => {
                tracing::error!(stream = %self.key, session_id = %id, error = %e, "Pull connect failed");
            }
            Err(e) => {
                tracing::debug!(stream = %self.key, session_id = %id, error = %e, "Pull loop done");
            }
        }

        result
    }

    /// Run [`Group::pull_from`] on its own task, bound to the group's lifetime
    pub fn spawn_pull<P>(
        self: &Arc<Self>,
        puller: P,
        addr: impl Into<String>,
        connect_timeout: Duration,
    ) -> JoinHandle<Result<()>>
    where
        P: UpstreamPuller + 'static,
    {
        let group = Arc::clone(self);
        let addr = addr.into();

        tokio::spawn(async move { group.pull_from(puller, &addr, connect_timeout).await })
    }

    /// Add a subscriber; its flags are used as given
    pub fn attach_subscriber(&self, subscriber: Subscriber) {
        let id = subscriber.id();
        let mut inner = self.inner.lock();
        inner.subscribers.insert(id, subscriber);

        tracing::debug!(
            stream = %self.key,
            session_id = %id,
            subscribers = inner.subscribers.len(),
            "Subscriber attached"
        );
    }

    /// Remove a subscriber. Returns false if it was not attached.
    pub fn detach_subscriber(&self, id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.subscribers.remove(&id).is_some();

        if removed {
            tracing::debug!(
                stream = %self.key,
                session_id = %id,
                subscribers = inner.subscribers.len(),
                "Subscriber detached"
            );
        }
        removed
    }

    /// Register the observer that sees every broadcast message.
    ///
    /// Set it before the source starts to be sure no message is missed.
    pub fn set_observer(&self, observer: Arc<dyn AvMessageObserver>) {
        self.inner.lock().observer = Some(observer);
    }

    pub fn clear_observer(&self) {
        self.inner.lock().observer = None;
    }

    /// No source and no subscribers
    pub fn is_total_empty(&self) -> bool {
        self.inner.lock().snapshot().is_total_empty()
    }

    /// A publisher or puller is attached
    pub fn is_source_attached(&self) -> bool {
        self.inner.lock().source.is_some()
    }

    /// Currently attached source, if any
    pub fn source(&self) -> Option<AttachedSource> {
        self.inner.lock().source
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Bootstrap state of an attached subscriber
    pub fn subscriber_state(&self, id: SessionId) -> Option<SubscriberState> {
        self.inner.lock().subscribers.get(&id).map(Subscriber::state)
    }

    pub fn stats(&self) -> GroupStats {
        self.inner.lock().stats.clone()
    }

    /// Broadcast one message from the source to every subscriber.
    ///
    /// Payloads too short to carry a tag byte pair are treated as ordinary
    /// frames: forwarded to streaming subscribers, never cached, and held
    /// back from subscribers waiting for a key frame. Types that are
    /// neither media, data nor command are not relayed. The observer sees
    /// every message.
    pub fn on_source_message(&self, header: &MessageHeader, timestamp_abs: u32, payload: &[u8]) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.stats.record_in(payload.len());

        match MediaClass::from_type_id(header.msg_type_id) {
            Some(class) => self.relay(inner, class, header.msg_type_id, timestamp_abs, payload),
            None => tracing::trace!(
                stream = %self.key,
                msg_type_id = header.msg_type_id,
                "Not relaying message"
            ),
        }

        if let Some(observer) = &inner.observer {
            observer.on_av_message(header, timestamp_abs, payload);
        }
    }

    fn relay(
        &self,
        inner: &mut GroupInner,
        class: MediaClass,
        msg_type_id: u8,
        timestamp_abs: u32,
        payload: &[u8],
    ) {
        let out_header = MessageHeader {
            csid: match class {
                MediaClass::Metadata | MediaClass::Command => CSID_AMF,
                MediaClass::Audio => CSID_AUDIO,
                MediaClass::Video => CSID_VIDEO,
            },
            msg_len: payload.len() as u32,
            timestamp: timestamp_abs,
            msg_type_id,
            msg_stream_id: MSID1,
        };
        let chunk_size = self.config.chunk_size;
        let packetize = || message_to_chunks(payload, &out_header, None, chunk_size);

        let avc_header = class == MediaClass::Video && is_avc_sequence_header(payload);
        let avc_key_nalu = class == MediaClass::Video && is_avc_key_nalu(payload);
        let aac_header = class == MediaClass::Audio && is_aac_sequence_header(payload);

        let mut chunks: Option<Bytes> = None;

        for subscriber in inner.subscribers.values_mut() {
            let chunks = chunks.get_or_insert_with(packetize);

            if subscriber.is_fresh {
                for cached in [
                    &inner.cached_metadata,
                    &inner.cached_video_header,
                    &inner.cached_audio_header,
                ]
                .into_iter()
                .flatten()
                {
                    inner.stats.record_write(cached.len());
                    subscriber.write(cached.clone());
                }
                subscriber.is_fresh = false;
                inner.stats.bootstraps += 1;
                continue;
            }

            let forward = if subscriber.wait_key_nalu {
                match class {
                    MediaClass::Metadata | MediaClass::Command => true,
                    MediaClass::Audio => aac_header,
                    MediaClass::Video if avc_key_nalu => {
                        subscriber.wait_key_nalu = false;
                        tracing::debug!(
                            stream = %self.key,
                            session_id = %subscriber.id(),
                            "Subscriber reached key frame"
                        );
                        true
                    }
                    MediaClass::Video if avc_header => true,
                    MediaClass::Video => {
                        inner.stats.gated_video += 1;
                        false
                    }
                }
            } else {
                true
            };

            if forward {
                inner.stats.record_write(chunks.len());
                subscriber.write(chunks.clone());
            }
        }

        let cache_slot = match class {
            MediaClass::Metadata => Some((&mut inner.cached_metadata, "metadata")),
            MediaClass::Video if avc_header => {
                Some((&mut inner.cached_video_header, "avc sequence header"))
            }
            MediaClass::Audio if aac_header => {
                Some((&mut inner.cached_audio_header, "aac sequence header"))
            }
            _ => None,
        };
        if let Some((slot, what)) = cache_slot {
            *slot = Some(chunks.get_or_insert_with(packetize).clone());
            tracing::debug!(stream = %self.key, timestamp = timestamp_abs, "Cached {}", what);
        }
    }

    /// Periodic idle/liveness loop.
    ///
    /// Wakes every `tick_interval` and asks the idle policy about the
    /// group. Returns [`LoopExit::Idle`] when the policy wants the group
    /// reclaimed, or [`LoopExit::Disposed`] after [`Group::dispose`].
    pub async fn run_loop(&self) -> LoopExit {
        let period = self.config.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(stream = %self.key, "Group loop stopped");
                    return LoopExit::Disposed;
                }
                _ = ticker.tick() => {
                    let snapshot = self.inner.lock().snapshot();
                    let verdict = self.idle_policy.lock().on_tick(&snapshot);
                    if verdict == IdleVerdict::Evict {
                        tracing::info!(stream = %self.key, "Group idle, requesting removal");
                        return LoopExit::Idle;
                    }
                }
            }
        }
    }

    /// Run [`Group::run_loop`] on its own task
    pub fn spawn_run_loop(self: &Arc<Self>) -> JoinHandle<LoopExit> {
        let group = Arc::clone(self);
        tokio::spawn(async move { group.run_loop().await })
    }

    /// Stop the idle loop and any pull bound to this group.
    ///
    /// Source and subscribers stay attached; detaching them is up to the
    /// caller.
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!(stream = %self.key, "Group disposed");
            self.shutdown.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl AvMessageObserver for Group {
    fn on_av_message(&self, header: &MessageHeader, timestamp_abs: u32, payload: &[u8]) {
        self.on_source_message(header, timestamp_abs, payload);
    }
}

async fn drive_pull<P: UpstreamPuller>(
    puller: &mut P,
    url: &str,
    connect_timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(connect_timeout, puller.connect(url)).await {
        Ok(connected) => connected?,
        Err(_) => {
            return Err(Error::ConnectTimeout {
                url: url.to_string(),
                timeout: connect_timeout,
            })
        }
    }

    puller.run_until_done().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{MSG_AUDIO, MSG_COMMAND_AMF0, MSG_DATA_AMF0, MSG_VIDEO};
    use crate::group::session::SubscriberSink;

    struct RecordingSink {
        id: SessionId,
        writes: Mutex<Vec<Bytes>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SessionId::next(),
                writes: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.writes.lock().len()
        }
    }

    impl SubscriberSink for RecordingSink {
        fn id(&self) -> SessionId {
            self.id
        }

        fn write(&self, data: Bytes) {
            self.writes.lock().push(data);
        }
    }

    struct TestPublisher {
        id: SessionId,
        observer: Mutex<Option<Arc<dyn AvMessageObserver>>>,
    }

    impl TestPublisher {
        fn new() -> Self {
            Self {
                id: SessionId::next(),
                observer: Mutex::new(None),
            }
        }

        fn emit(&self, msg_type_id: u8, timestamp: u32, payload: &[u8]) {
            let header = MessageHeader::new(msg_type_id, timestamp, payload.len() as u32);
            if let Some(observer) = self.observer.lock().clone() {
                observer.on_av_message(&header, timestamp, payload);
            }
        }
    }

    impl SourceSession for TestPublisher {
        fn id(&self) -> SessionId {
            self.id
        }

        fn set_observer(&self, observer: Arc<dyn AvMessageObserver>) {
            *self.observer.lock() = Some(observer);
        }
    }

    fn msg(msg_type_id: u8, timestamp: u32, payload: &[u8]) -> (MessageHeader, u32, Vec<u8>) {
        (
            MessageHeader::new(msg_type_id, timestamp, payload.len() as u32),
            timestamp,
            payload.to_vec(),
        )
    }

    #[test]
    fn test_new_group_is_empty() {
        let group = Group::new("live", "test");

        assert_eq!(group.key().to_string(), "live/test");
        assert!(group.is_total_empty());
        assert!(!group.is_source_attached());
        assert_eq!(group.subscriber_count(), 0);
    }

    #[test]
    fn test_attach_source_registers_group_as_observer() {
        let group = Arc::new(Group::new("live", "test"));
        let publisher = TestPublisher::new();
        let sink = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(sink.clone(), false, false));

        group.attach_source(&publisher);
        publisher.emit(MSG_AUDIO, 10, &[0xAF, 0x01, 0x21]);

        assert_eq!(
            group.source(),
            Some(AttachedSource {
                kind: SourceKind::Publisher,
                id: publisher.id,
            })
        );
        assert_eq!(sink.count(), 1);
        assert_eq!(group.stats().messages_in, 1);
    }

    #[test]
    fn test_detach_source_ignores_id() {
        let group = Arc::new(Group::new("live", "test"));
        let publisher = TestPublisher::new();
        group.attach_source(&publisher);

        group.detach_source(SessionId(u64::MAX));

        assert!(!group.is_source_attached());
    }

    #[test]
    fn test_outbound_framing() {
        let group = Group::new("live", "test");
        let sink = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(sink.clone(), false, false));

        let (header, ts, payload) = msg(MSG_VIDEO, 0x0102, &[0x27, 0x01, 0x00]);
        // Inbound on some other chunk stream and message stream
        let header = header.csid(20).stream_id(9);
        group.on_source_message(&header, ts, &payload);

        let writes = sink.writes.lock();
        assert_eq!(
            &writes[0][..],
            &[
                0x07, 0x00, 0x01, 0x02, 0x00, 0x00, 0x03, 0x09, 0x01, 0x00, 0x00, 0x00, 0x27,
                0x01, 0x00
            ]
        );
    }

    #[test]
    fn test_chunks_shared_between_subscribers() {
        let group = Group::new("live", "test");
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(a.clone(), false, false));
        group.attach_subscriber(Subscriber::with_flags(b.clone(), false, false));

        let (header, ts, payload) = msg(MSG_VIDEO, 40, &[0x27, 0x01, 0x00, 0x00, 0x00]);
        group.on_source_message(&header, ts, &payload);

        let a_writes = a.writes.lock();
        let b_writes = b.writes.lock();
        assert_eq!(a_writes[0], b_writes[0]);
        // Same allocation, not a copy
        assert_eq!(a_writes[0].as_ptr(), b_writes[0].as_ptr());
    }

    #[test]
    fn test_command_messages_relayed_not_cached() {
        let group = Group::new("live", "test");
        let waiting = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(waiting.clone(), false, true));

        let (header, ts, payload) = msg(MSG_COMMAND_AMF0, 0, &[0x02, 0x00, 0x08]);
        group.on_source_message(&header, ts, &payload);

        // Command channel is never gated and goes out on the data csid
        assert_eq!(waiting.count(), 1);
        assert_eq!(waiting.writes.lock()[0][0], CSID_AMF as u8);

        let fresh = RecordingSink::new();
        group.attach_subscriber(Subscriber::new(fresh.clone()));
        group.on_source_message(&header, ts, &payload);
        assert_eq!(fresh.count(), 0);
        assert_eq!(group.stats().bootstraps, 1);
    }

    #[test]
    fn test_control_messages_not_relayed() {
        let group = Group::new("live", "test");
        let sink = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(sink.clone(), false, false));

        // User control message
        let (header, ts, payload) = msg(4, 0, &[0x00, 0x00]);
        group.on_source_message(&header, ts, &payload);

        assert_eq!(sink.count(), 0);
        assert_eq!(group.stats().messages_in, 1);
    }

    #[test]
    fn test_short_payload_does_not_panic() {
        let group = Group::new("live", "test");
        let waiting = RecordingSink::new();
        let streaming = RecordingSink::new();
        group.attach_subscriber(Subscriber::with_flags(waiting.clone(), false, true));
        group.attach_subscriber(Subscriber::with_flags(streaming.clone(), false, false));

        group.on_source_message(&MessageHeader::new(MSG_VIDEO, 0, 1), 0, &[0x17]);
        group.on_source_message(&MessageHeader::new(MSG_AUDIO, 0, 0), 0, &[]);

        assert_eq!(waiting.count(), 0);
        assert_eq!(streaming.count(), 2);
    }

    #[test]
    fn test_observer_sees_original_message() {
        struct Capture(Mutex<Vec<(MessageHeader, u32, Vec<u8>)>>);

        impl AvMessageObserver for Capture {
            fn on_av_message(&self, header: &MessageHeader, timestamp_abs: u32, payload: &[u8]) {
                self.0.lock().push((*header, timestamp_abs, payload.to_vec()));
            }
        }

        let group = Group::new("live", "test");
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        group.set_observer(capture.clone());

        let (header, ts, payload) = msg(MSG_DATA_AMF0, 0, &[0x02, 0x00, 0x0A]);
        let header = header.csid(4).stream_id(1);
        group.on_source_message(&header, ts, &payload);

        {
            let seen = capture.0.lock();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, header);
            assert_eq!(seen[0].2, payload);
        }

        group.clear_observer();
        group.on_source_message(&header, ts, &payload);
        assert_eq!(capture.0.lock().len(), 1);
    }

    #[test]
    fn test_stats_track_gating_and_bootstrap() {
        let group = Group::new("live", "test");
        let sink = RecordingSink::new();
        group.attach_subscriber(Subscriber::new(sink.clone()));

        // Bootstrap (nothing cached yet), then one gated inter frame
        for _ in 0..2 {
            let (header, ts, payload) = msg(MSG_VIDEO, 0, &[0x27, 0x01]);
            group.on_source_message(&header, ts, &payload);
        }

        let stats = group.stats();
        assert_eq!(stats.messages_in, 2);
        assert_eq!(stats.bootstraps, 1);
        assert_eq!(stats.gated_video, 1);
        assert_eq!(stats.chunk_writes, 0);
        assert_eq!(group.subscriber_state(sink.id), Some(SubscriberState::WaitingKeyFrame));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let group = Group::new("live", "test");
        assert!(!group.is_disposed());

        group.dispose();
        group.dispose();

        assert!(group.is_disposed());
    }
}
