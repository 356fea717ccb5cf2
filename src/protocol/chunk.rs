//! Message to chunk packetizer
//!
//! Splits one RTMP message into wire chunks:
//!
//! ```text
//! +--------------+----------------+--------------------+--------------+
//! | Basic Header | Message Header | Extended Timestamp | Chunk Data   |
//! | (1-3 bytes)  | (0,3,7,11)     | (0 or 4 bytes)     | (<= chunk sz)|
//! +--------------+----------------+--------------------+--------------+
//! ```
//!
//! The first chunk carries a format 0, 1 or 2 message header, every
//! following chunk of the same message is a format 3 continuation.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::*;

/// Header describing one RTMP message on a chunk stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Chunk stream id
    pub csid: u32,
    /// Payload length in bytes
    pub msg_len: u32,
    /// Timestamp in milliseconds (absolute for format 0)
    pub timestamp: u32,
    /// Message type id
    pub msg_type_id: u8,
    /// Message stream id
    pub msg_stream_id: u32,
}

impl MessageHeader {
    /// Create a header for a message of the given type
    pub fn new(msg_type_id: u8, timestamp: u32, msg_len: u32) -> Self {
        Self {
            csid: 0,
            msg_len,
            timestamp,
            msg_type_id,
            msg_stream_id: 0,
        }
    }

    /// Set the chunk stream id
    pub fn csid(mut self, csid: u32) -> Self {
        self.csid = csid;
        self
    }

    /// Set the message stream id
    pub fn stream_id(mut self, msg_stream_id: u32) -> Self {
        self.msg_stream_id = msg_stream_id;
        self
    }
}

/// Pick the message header format for the first chunk of `header`
fn first_chunk_format(header: &MessageHeader, prev: Option<&MessageHeader>) -> u8 {
    match prev {
        Some(p) if p.msg_stream_id == header.msg_stream_id => {
            if p.msg_len == header.msg_len && p.msg_type_id == header.msg_type_id {
                CHUNK_FMT_2
            } else {
                CHUNK_FMT_1
            }
        }
        _ => CHUNK_FMT_0,
    }
}

/// Write a 1, 2 or 3 byte basic header. `csid` is clamped to
/// `MIN_CSID..=MAX_CSID`.
fn put_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    let csid = csid.clamp(MIN_CSID, MAX_CSID);
    let fmt_bits = fmt << 6;
    if csid < 64 {
        out.put_u8(fmt_bits | csid as u8);
    } else if csid < 320 {
        out.put_u8(fmt_bits);
        out.put_u8((csid - 64) as u8);
    } else {
        let id = csid - 64;
        out.put_u8(fmt_bits | 1);
        out.put_u8((id & 0xFF) as u8);
        out.put_u8(((id >> 8) & 0xFF) as u8);
    }
}

/// Packetize `payload` into RTMP chunks of at most `chunk_size` data bytes.
///
/// With `prev` absent (or on a different message stream) the message is
/// written with an absolute timestamp. Otherwise the timestamp field holds
/// the delta from `prev`, and the length/type fields are omitted when they
/// match.
///
/// Valid chunk stream ids are 2..=65599. Values outside that range are
/// clamped to it.
pub fn message_to_chunks(
    payload: &[u8],
    header: &MessageHeader,
    prev: Option<&MessageHeader>,
    chunk_size: u32,
) -> Bytes {
    let chunk_size = chunk_size.max(1) as usize;
    let num_chunks = payload.len().div_ceil(chunk_size).max(1);

    let fmt = first_chunk_format(header, prev);
    let ts_field = match prev {
        Some(p) if fmt != CHUNK_FMT_0 => header.timestamp.wrapping_sub(p.timestamp),
        _ => header.timestamp,
    };
    let extended = ts_field >= MAX_TIMESTAMP_IN_MESSAGE_HEADER;
    let ts_in_header = if extended {
        MAX_TIMESTAMP_IN_MESSAGE_HEADER
    } else {
        ts_field
    };

    let mut out = BytesMut::with_capacity(payload.len() + num_chunks * MAX_CHUNK_HEADER_SIZE);
    let mut offset = 0;

    loop {
        let end = (offset + chunk_size).min(payload.len());

        if offset == 0 {
            put_basic_header(&mut out, fmt, header.csid);
            out.put_uint(u64::from(ts_in_header), 3);
            if fmt <= CHUNK_FMT_1 {
                out.put_uint(u64::from(header.msg_len), 3);
                out.put_u8(header.msg_type_id);
            }
            if fmt == CHUNK_FMT_0 {
                out.put_u32_le(header.msg_stream_id);
            }
        } else {
            put_basic_header(&mut out, CHUNK_FMT_3, header.csid);
        }

        if extended {
            out.put_u32(ts_field);
        }

        out.put_slice(&payload[offset..end]);
        offset = end;

        if offset >= payload.len() {
            break;
        }
    }

    out.freeze()
}
