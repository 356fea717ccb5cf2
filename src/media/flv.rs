//! FLV tag-byte sniffing
//!
//! Each RTMP audio/video message body is an FLV tag body. The first one or
//! two bytes are enough to tell sequence headers and key frames apart,
//! which is all a relay group needs.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+---------------+
//! | FrameType| CodecID  | AVCPacketType | ...
//! | (4 bits) | (4 bits) | (1 byte)      |
//! +----------+----------+---------------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+---------+----------+----------+---------------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACPacketType | ...
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  | (1 byte)      |
//! +-----------+---------+----------+----------+---------------+
//! ```

use crate::protocol::constants::{
    MSG_AUDIO, MSG_COMMAND_AMF0, MSG_COMMAND_AMF3, MSG_DATA_AMF0, MSG_DATA_AMF3, MSG_VIDEO,
};

/// First video byte of an AVC key frame: frame type 1, codec id 7
pub const AVC_KEY_FRAME_TAG: u8 = 0x17;

/// Sound format nibble for AAC
pub const AAC_SOUND_FORMAT: u8 = 0x0A;

/// What a group does with a message, decided by its type id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    /// Data message (onMetaData); never gated
    Metadata,
    /// Command message; relayed on the data channel, never gated or cached
    Command,
    /// Audio message
    Audio,
    /// Video message
    Video,
}

impl MediaClass {
    /// Classify an RTMP message type id. Protocol control and other
    /// non-relayed types yield `None`.
    pub fn from_type_id(msg_type_id: u8) -> Option<Self> {
        match msg_type_id {
            MSG_DATA_AMF0 | MSG_DATA_AMF3 => Some(MediaClass::Metadata),
            MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3 => Some(MediaClass::Command),
            MSG_AUDIO => Some(MediaClass::Audio),
            MSG_VIDEO => Some(MediaClass::Video),
            _ => None,
        }
    }
}

/// AVC packet type (second video byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord
    SequenceHeader = 0,
    /// One or more NAL units
    Nalu = 1,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            _ => None,
        }
    }
}

/// AAC packet type (second audio byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// AudioSpecificConfig
    SequenceHeader = 0,
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

fn avc_key_packet_type(payload: &[u8]) -> Option<AvcPacketType> {
    match payload {
        [AVC_KEY_FRAME_TAG, packet_type, ..] => AvcPacketType::from_byte(*packet_type),
        _ => None,
    }
}

/// `0x17 0x00`: AVC sequence header on a key frame tag.
///
/// Payloads shorter than two bytes never match.
pub fn is_avc_sequence_header(payload: &[u8]) -> bool {
    avc_key_packet_type(payload) == Some(AvcPacketType::SequenceHeader)
}

/// `0x17 0x01`: AVC NALU packet on a key frame tag.
pub fn is_avc_key_nalu(payload: &[u8]) -> bool {
    avc_key_packet_type(payload) == Some(AvcPacketType::Nalu)
}

/// Sound format 10 (AAC) with packet type 0.
pub fn is_aac_sequence_header(payload: &[u8]) -> bool {
    match payload {
        [tag, packet_type, ..] => {
            (tag >> 4) == AAC_SOUND_FORMAT
                && AacPacketType::from_byte(*packet_type) == Some(AacPacketType::SequenceHeader)
        }
        _ => false,
    }
}
