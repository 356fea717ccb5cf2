//! Media inspection for relaying
//!
//! A relay never decodes media. It only looks at FLV tag bytes to find
//! sequence headers and key frames.

pub mod flv;

pub use flv::{is_aac_sequence_header, is_avc_key_nalu, is_avc_sequence_header, MediaClass};
