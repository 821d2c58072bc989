// Wire header and framing primitives, kept separate from `frame.rs`: the
// header (codec) is decoded independently of the typed frame bodies (frame).

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;
use thiserror::Error;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: u32 = 4096;

/// Fixed header size: type(2) + seq(4) + total(4) + size(4).
pub const HEADER_SIZE: usize = 14;

/// Wire frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum FrameType {
    UploadReq = 0,
    UploadData = 1,
    DownloadReq = 2,
    DownloadData = 3,
    DeleteReq = 4,
    ListServerReq = 5,
    ListServerRes = 6,
    ListClientReq = 7,
    SyncEvent = 8,
    GetSyncDir = 9,
    Ack = 10,
    Nack = 11,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete frame: need more data")]
    Incomplete,

    #[error("invalid frame type: {0:#x}")]
    InvalidFrameType(u16),

    #[error("payload size {size} exceeds MAX_PAYLOAD ({max})")]
    PayloadTooLarge { size: u32, max: u32 },

    #[error("invalid filename: {0}")]
    InvalidFilename(#[from] crate::model::filename::FilenameError),

    #[error("utf-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Common 14-byte frame header, big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub seq: u32,
    pub total: u32,
    pub size: u32,
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_SIZE;

    /// Peek the header without consuming it, to decide whether enough bytes
    /// are buffered to parse a whole frame.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
        if (src.remaining() as u64) < Self::SIZE as u64 {
            return Err(CodecError::Incomplete);
        }
        let start = src.position();
        src.advance(2); // type
        src.advance(4); // seq
        src.advance(4); // total
        let size = src.get_u32();
        src.set_position(start);

        if size > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge { size, max: MAX_PAYLOAD });
        }

        let total_len = Self::SIZE + size as usize;
        if (src.remaining() as u64) < total_len as u64 {
            return Err(CodecError::Incomplete);
        }
        Ok(total_len)
    }

    pub fn decode(src: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if src.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }
        let raw_type = src.get_u16();
        let frame_type = FrameType::try_from_primitive(raw_type)
            .map_err(|_| CodecError::InvalidFrameType(raw_type))?;
        let seq = src.get_u32();
        let total = src.get_u32();
        let size = src.get_u32();
        if size > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge { size, max: MAX_PAYLOAD });
        }
        Ok(FrameHeader { frame_type, seq, total, size })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.frame_type.into());
        buf.put_u32(self.seq);
        buf.put_u32(self.total);
        buf.put_u32(self.size);
    }
}
