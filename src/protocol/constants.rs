//! RTMP protocol constants used on the outbound side of a group

/// Audio data message
pub const MSG_AUDIO: u8 = 8;
/// Video data message
pub const MSG_VIDEO: u8 = 9;
/// AMF3 data message (onMetaData sent by AMF3 encoders)
pub const MSG_DATA_AMF3: u8 = 15;
/// AMF3 command message
pub const MSG_COMMAND_AMF3: u8 = 17;
/// AMF0 data message (@setDataFrame / onMetaData)
pub const MSG_DATA_AMF0: u8 = 18;
/// AMF0 command message
pub const MSG_COMMAND_AMF0: u8 = 20;

/// Chunk stream for data/command messages relayed to subscribers
pub const CSID_AMF: u32 = 5;
/// Chunk stream for audio
pub const CSID_AUDIO: u32 = 6;
/// Chunk stream for video
pub const CSID_VIDEO: u32 = 7;

/// Lowest chunk stream id a message may use (0 and 1 mark longer basic headers)
pub const MIN_CSID: u32 = 2;
/// Highest chunk stream id a 3 byte basic header can carry
pub const MAX_CSID: u32 = 65599;

/// Message stream id every subscriber plays on
pub const MSID1: u32 = 1;

/// Chunk size used when re-chunking messages for subscribers
pub const LOCAL_CHUNK_SIZE: u32 = 4096;
/// Smallest chunk size we accept in configuration
pub const MIN_CHUNK_SIZE: u32 = 128;
/// Largest chunk size allowed by the protocol
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Timestamps at or above this value use the extended timestamp field
pub const MAX_TIMESTAMP_IN_MESSAGE_HEADER: u32 = 0xFF_FFFF;

/// Chunk message header formats
pub const CHUNK_FMT_0: u8 = 0;
pub const CHUNK_FMT_1: u8 = 1;
pub const CHUNK_FMT_2: u8 = 2;
pub const CHUNK_FMT_3: u8 = 3;

/// Largest basic header (3 bytes) + type 0 message header (11) + extended timestamp (4)
pub const MAX_CHUNK_HEADER_SIZE: usize = 18;
