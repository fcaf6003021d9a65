//! Frame codec for the TCP transport
//!
//! Handles framing of transactions on a byte stream. Header layout
//! (big-endian):
//! - 4 bytes magic
//! - 1 byte frame kind
//! - 4 bytes sequence number
//! - 4 bytes transaction code
//! - 4 bytes flags
//! - 4 bytes status (replies)
//! - 4 bytes payload length

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;

/// Magic bytes for frame identification
pub const MAGIC_BYTES: [u8; 4] = [0x4D, 0x42, 0x52, 0x47]; // "MBRG"

/// Header size: magic(4) + kind(1) + sequence(4) + code(4) + flags(4) + status(4) + length(4)
const HEADER_SIZE: usize = 25;

/// Default maximum payload size (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unknown frame kind: {0}")]
    InvalidKind(u8),

    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Direction of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 1,
    Reply = 2,
}

impl FrameKind {
    fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(FrameKind::Request),
            2 => Ok(FrameKind::Reply),
            other => Err(CodecError::InvalidKind(other)),
        }
    }
}

/// One transaction leg on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Pairs a reply with its request
    pub sequence: u32,
    pub code: u32,
    pub flags: u32,
    /// Transaction status; zero on requests
    pub status: i32,
    /// Encoded parcel
    pub payload: Bytes,
}

impl Frame {
    pub fn request(sequence: u32, code: u32, flags: u32, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Request,
            sequence,
            code,
            flags,
            status: 0,
            payload,
        }
    }

    /// Reply answering `request`
    pub fn reply_to(request: &Frame, status: i32, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Reply,
            sequence: request.sequence,
            code: request.code,
            flags: request.flags,
            status,
            payload,
        }
    }
}

/// Encodes frames into the wire format
#[derive(Debug, Clone)]
pub struct Encoder {
    max_message_size: usize,
}

impl Encoder {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Encode a frame into a buffer
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) -> Result<(), CodecError> {
        if frame.payload.len() > self.max_message_size {
            return Err(CodecError::MessageTooLarge(
                frame.payload.len(),
                self.max_message_size,
            ));
        }

        buf.reserve(HEADER_SIZE + frame.payload.len());
        buf.put_slice(&MAGIC_BYTES);
        buf.put_u8(frame.kind as u8);
        buf.put_u32(frame.sequence);
        buf.put_u32(frame.code);
        buf.put_u32(frame.flags);
        buf.put_i32(frame.status);
        buf.put_u32(frame.payload.len() as u32);
        buf.put_slice(&frame.payload);
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Decodes frames from the wire format
#[derive(Debug)]
pub struct Decoder {
    state: DecodeState,
    max_message_size: usize,
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload {
        kind: FrameKind,
        sequence: u32,
        code: u32,
        flags: u32,
        status: i32,
        length: usize,
    },
}

impl Decoder {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_message_size,
        }
    }

    /// Whether no frame is partially consumed
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Header)
    }

    /// Attempt to decode a frame from the buffer
    /// Returns Ok(None) if more data is needed
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    if buf[0..4] != MAGIC_BYTES {
                        return Err(CodecError::InvalidMagic);
                    }

                    let mut header = &buf[4..HEADER_SIZE];
                    let kind = FrameKind::from_u8(header.get_u8())?;
                    let sequence = header.get_u32();
                    let code = header.get_u32();
                    let flags = header.get_u32();
                    let status = header.get_i32();
                    let length = header.get_u32() as usize;

                    if length > self.max_message_size {
                        return Err(CodecError::MessageTooLarge(length, self.max_message_size));
                    }

                    buf.advance(HEADER_SIZE);

                    self.state = DecodeState::Payload {
                        kind,
                        sequence,
                        code,
                        flags,
                        status,
                        length,
                    };
                }
                DecodeState::Payload {
                    kind,
                    sequence,
                    code,
                    flags,
                    status,
                    length,
                } => {
                    if buf.len() < *length {
                        return Ok(None);
                    }

                    let frame = Frame {
                        kind: *kind,
                        sequence: *sequence,
                        code: *code,
                        flags: *flags,
                        status: *status,
                        payload: buf.split_to(*length).freeze(),
                    };

                    self.state = DecodeState::Header;

                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
