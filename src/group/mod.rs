//! Per-stream fan-out groups
//!
//! A [`Group`] relays one stream from a single source, a local publisher or
//! a pulled upstream, to any number of subscribers:
//!
//! ```text
//!    [Publisher] ──┐                        ┌──► sink A ──► writer task ──► TCP
//!                  ├──► Group::on_av_message┼──► sink B ──► writer task ──► TCP
//!      [Puller] ───┘   (one lock)           └──► observer (recorder, remuxer)
//! ```
//!
//! Late joiners get the cached metadata and sequence headers first, then
//! video is held back until the next AVC key frame. Groups do not manage
//! their own lifetime: a registry polls [`Group::is_total_empty`] or awaits
//! [`Group::run_loop`] and drops them.

pub mod config;
pub mod fanout;
pub mod idle;
pub mod key;
pub mod observer;
pub mod session;
pub mod stats;
pub mod subscriber;

pub use self::config::GroupConfig;
pub use self::fanout::Group;
pub use self::idle::{EvictAfterIdleTicks, GroupSnapshot, IdlePolicy, IdleVerdict, LoopExit, NeverEvict};
pub use self::key::StreamKey;
pub use self::observer::AvMessageObserver;
pub use self::session::{
    AttachedSource, SessionId, SourceKind, SourceSession, Subscriber, SubscriberSink,
    SubscriberState, UpstreamPuller,
};
pub use self::stats::GroupStats;
pub use self::subscriber::{spawn_writer, ChannelSink};
