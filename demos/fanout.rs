//! In-process fan-out demo
//!
//! A fake publisher pushes a short AVC/AAC stream into a group. One player
//! joins before the stream starts, one joins mid-GOP and one never reads.
//!
//! Run with: RUST_LOG=debug cargo run --example fanout

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use rtmp_relay::group::{
    spawn_writer, AvMessageObserver, ChannelSink, Group, SessionId, SourceSession, Subscriber,
    SubscriberSink,
};
use rtmp_relay::protocol::constants::{MSG_AUDIO, MSG_DATA_AMF0, MSG_VIDEO};
use rtmp_relay::MessageHeader;

struct FakePublisher {
    id: SessionId,
    observer: Mutex<Option<Arc<dyn AvMessageObserver>>>,
}

impl FakePublisher {
    fn emit(&self, msg_type_id: u8, timestamp: u32, payload: &[u8]) {
        let header = MessageHeader::new(msg_type_id, timestamp, payload.len() as u32);
        if let Some(observer) = self.observer.lock().clone() {
            observer.on_av_message(&header, timestamp, payload);
        }
    }
}

impl SourceSession for FakePublisher {
    fn id(&self) -> SessionId {
        self.id
    }

    fn set_observer(&self, observer: Arc<dyn AvMessageObserver>) {
        *self.observer.lock() = Some(observer);
    }
}

/// Attach a player whose chunks are read back from an in-memory pipe
fn attach_player(group: &Group, name: &'static str) -> (Arc<ChannelSink>, tokio::task::JoinHandle<usize>) {
    let (sink, rx) = ChannelSink::channel(SessionId::next(), group.config().subscriber_queue_capacity);
    let (transport, mut player) = tokio::io::duplex(64 * 1024);
    let _writer = spawn_writer(rx, transport);
    group.attach_subscriber(Subscriber::new(sink.clone()));

    let reader = tokio::spawn(async move {
        let mut received = Vec::new();
        let _ = player.read_to_end(&mut received).await;
        println!("{name}: received {} bytes of chunks", received.len());
        received.len()
    });
    (sink, reader)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let group = Arc::new(Group::new("live", "demo"));
    let idle = group.spawn_run_loop();

    let publisher = FakePublisher {
        id: SessionId::next(),
        observer: Mutex::new(None),
    };
    group.attach_source(&publisher);

    let (early, early_reader) = attach_player(&group, "early player");

    // Player that stalls: small queue, never drained
    let (stalled, _stalled_rx) = ChannelSink::channel(SessionId::next(), 2);
    group.attach_subscriber(Subscriber::new(stalled.clone()));

    publisher.emit(MSG_DATA_AMF0, 0, &[0x02, 0x00, 0x0A]);
    publisher.emit(MSG_VIDEO, 0, &[0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x64]);
    publisher.emit(MSG_AUDIO, 0, &[0xAF, 0x00, 0x12, 0x10]);

    let mut late = None;
    for frame in 0..60u32 {
        let ts = frame * 33;
        if frame % 30 == 0 {
            publisher.emit(MSG_VIDEO, ts, &[0x17, 0x01, 0x00, 0x00, 0x00, 0x65]);
        } else {
            publisher.emit(MSG_VIDEO, ts, &[0x27, 0x01, 0x00, 0x00, 0x00, 0x41]);
        }
        publisher.emit(MSG_AUDIO, ts, &[0xAF, 0x01, 0x21]);

        if frame == 10 {
            late = Some(attach_player(&group, "late player"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = group.stats();
    println!(
        "messages in: {}, chunk writes: {}, gated video: {}, stalled drops: {}",
        stats.messages_in,
        stats.chunk_writes,
        stats.gated_video,
        stalled.dropped()
    );

    group.detach_source(publisher.id());
    for sink in [Some(&early), late.as_ref().map(|(sink, _)| sink)].into_iter().flatten() {
        group.detach_subscriber(sink.id());
    }
    group.detach_subscriber(stalled.id());

    // Dropping the last sink handles closes each writer, ending the readers
    drop(early);
    let _ = early_reader.await;
    if let Some((sink, reader)) = late {
        drop(sink);
        let _ = reader.await;
    }

    println!("group empty: {}", group.is_total_empty());
    group.dispose();
    let _ = idle.await;
}
