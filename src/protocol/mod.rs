//! RTMP protocol framing
//!
//! Only the outbound direction lives here: constants for the chunk streams a
//! group writes on and the packetizer that turns one message into chunks.
//! Handshake, chunk parsing and AMF belong to the connection layer.

pub mod chunk;
pub mod constants;

pub use chunk::{message_to_chunks, MessageHeader};
