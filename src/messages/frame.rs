//! Binary frame codec for the prepared-statement path.
//!
//! A frame is a fixed 24-byte header of three big-endian `u64`s (correlation
//! id, statement id, payload type) followed immediately by the raw payload.
//! The payload carries no length prefix; its internal framing is opaque to
//! this layer.

use crate::error::{Result, TransportError};

/// Size of the fixed binary frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;

/// The three header fields of a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub req_id: u64,
    pub stmt_id: u64,
    pub payload_type: u64,
}

impl FrameHeader {
    pub fn new(req_id: u64, stmt_id: u64, payload_type: u64) -> Self {
        Self {
            req_id,
            stmt_id,
            payload_type,
        }
    }

    /// Split an inbound binary message into its header and payload.
    pub fn parse(bytes: &[u8]) -> Result<(FrameHeader, &[u8])> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(TransportError::CorruptedFrame(format!(
                "{} bytes is too short for the {}-byte header",
                bytes.len(),
                FRAME_HEADER_SIZE
            )));
        }

        let mut field = [0u8; 8];
        field.copy_from_slice(&bytes[0..8]);
        let req_id = u64::from_be_bytes(field);
        field.copy_from_slice(&bytes[8..16]);
        let stmt_id = u64::from_be_bytes(field);
        field.copy_from_slice(&bytes[16..24]);
        let payload_type = u64::from_be_bytes(field);

        Ok((
            FrameHeader {
                req_id,
                stmt_id,
                payload_type,
            },
            &bytes[FRAME_HEADER_SIZE..],
        ))
    }
}

/// Build the wire bytes for one binary frame.
pub fn encode_frame(header: FrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.req_id.to_be_bytes());
    frame.extend_from_slice(&header.stmt_id.to_be_bytes());
    frame.extend_from_slice(&header.payload_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
