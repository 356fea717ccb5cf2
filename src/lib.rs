//! rtmp-relay: fan-out core of an RTMP relay
//!
//! This library provides the per-stream hub that sits between one source and
//! many players:
//! - Single source per stream (local publisher or pulled upstream)
//! - Re-chunking of each message once, shared by every subscriber
//! - Cached metadata and AVC/AAC sequence headers for late joiners
//! - Key-frame gating so new players start on a decodable frame
//! - Observer hook for recorders and protocol bridges
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_relay::group::{spawn_writer, ChannelSink, Group, SessionId, Subscriber, SubscriberSink};
//!
//! # async fn example(socket: tokio::net::TcpStream) {
//! let group = Arc::new(Group::new("live", "room_42"));
//! let idle = group.spawn_run_loop();
//!
//! // A player connected: queue its chunks and drain them into the socket
//! let (sink, rx) = ChannelSink::channel(SessionId::next(), group.config().subscriber_queue_capacity);
//! let writer = spawn_writer(rx, socket);
//! group.attach_subscriber(Subscriber::new(sink.clone()));
//!
//! // ... a publisher attaches with `group.attach_source(&publisher)` ...
//!
//! let _ = writer.await;
//! group.detach_subscriber(sink.id());
//! group.dispose();
//! let _ = idle.await;
//! # }
//! ```

pub mod error;
pub mod group;
pub mod media;
pub mod protocol;

pub use error::{Error, Result};
pub use group::{Group, GroupConfig, StreamKey};
pub use protocol::chunk::{message_to_chunks, MessageHeader};
