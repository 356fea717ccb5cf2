//! Channel-backed subscriber sink
//!
//! The group writes into a bounded `mpsc` queue with `try_send`, and a
//! writer task drains the queue into the subscriber's transport. A stalled
//! transport fills its own queue; further messages for that subscriber are
//! dropped while every other subscriber keeps receiving.
//!
//! Every message written by a group is a self-contained type 0 chunk
//! sequence, so dropping whole writes keeps the chunk stream decodable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::session::{SessionId, SubscriberSink};

/// Subscriber sink that queues writes on a bounded channel
#[derive(Debug)]
pub struct ChannelSink {
    id: SessionId,
    tx: mpsc::Sender<Bytes>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiver its writer task drains
    pub fn channel(id: SessionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Arc::new(Self {
            id,
            tx,
            dropped: AtomicU64::new(0),
        });
        (sink, rx)
    }

    /// Writes discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SubscriberSink for ChannelSink {
    fn id(&self) -> SessionId {
        self.id
    }

    fn write(&self, data: Bytes) {
        match self.tx.try_send(data) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    tracing::warn!(
                        session_id = %self.id,
                        dropped = dropped,
                        "Subscriber queue full, dropping message"
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(session_id = %self.id, "Subscriber queue closed");
            }
        }
    }
}

/// Drain `rx` into `writer` until the queue closes or a write fails.
///
/// Queued writes are coalesced before each flush.
pub fn spawn_writer<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> JoinHandle<std::io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            writer.write_all(&data).await?;
            while let Ok(more) = rx.try_recv() {
                writer.write_all(&more).await?;
            }
            writer.flush().await?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_reaches_receiver() {
        let (sink, mut rx) = ChannelSink::channel(SessionId(1), 4);

        sink.write(Bytes::from_static(b"abc"));

        assert_eq!(sink.id(), SessionId(1));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (sink, mut rx) = ChannelSink::channel(SessionId(2), 1);

        sink.write(Bytes::from_static(b"1"));
        sink.write(Bytes::from_static(b"2"));
        sink.write(Bytes::from_static(b"3"));

        assert_eq!(sink.dropped(), 2);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_silent() {
        let (sink, rx) = ChannelSink::channel(SessionId(3), 1);
        drop(rx);

        sink.write(Bytes::from_static(b"x"));

        assert!(sink.is_closed());
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_writer_drains_into_transport() {
        let (sink, rx) = ChannelSink::channel(SessionId(4), 8);
        let (client, mut server) = tokio::io::duplex(1024);

        let writer = spawn_writer(rx, client);
        sink.write(Bytes::from_static(b"hello "));
        sink.write(Bytes::from_static(b"world"));
        drop(sink);

        writer.await.unwrap().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");
    }
}
