//! Message observer hook
//!
//! Sources deliver messages to a group through this trait, and a group
//! forwards every broadcast message to one registered observer (a
//! recorder, a remuxer for another protocol, ...).

use crate::protocol::chunk::MessageHeader;

/// Receiver of decoded audio/video/data messages
pub trait AvMessageObserver: Send + Sync {
    /// Called once per message, in source order.
    ///
    /// `header` is the inbound header as decoded by the source session and
    /// `payload` the complete message body. When called by a group this runs
    /// with the group lock held, so implementations must not block or call
    /// back into the same group.
    fn on_av_message(&self, header: &MessageHeader, timestamp_abs: u32, payload: &[u8]);
}
