//! The typed sync protocol frame, and the `check`/`parse` pair used by
//! `Connection` to pull one frame at a time out of a buffered byte stream.
//! `check` peeks the header to decide whether a full frame is buffered yet,
//! `parse` consumes a `Cursor` that `check` has already validated.

use crate::codec::{CodecError, FrameHeader, FrameType, MAX_PAYLOAD};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Filename is carried raw (unvalidated); the receiving engine runs it
    /// through `Filename::parse` and NACKs on violation.
    UploadReq { seq: u32, name: String },
    UploadData { seq: u32, total: u32, data: Bytes },
    DownloadReq { seq: u32, name: String },
    DownloadData { seq: u32, total: u32, data: Bytes },
    DeleteReq { seq: u32, name: String },
    ListServerReq { seq: u32 },
    ListServerRes { seq: u32, listing: String },
    ListClientReq { seq: u32 },
    SyncEvent { seq: u32, name: String },
    GetSyncDir { seq: u32, username: String },
    Ack { seq: u32 },
    Nack { seq: u32, reason: String },
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::UploadReq { .. } => FrameType::UploadReq,
            Frame::UploadData { .. } => FrameType::UploadData,
            Frame::DownloadReq { .. } => FrameType::DownloadReq,
            Frame::DownloadData { .. } => FrameType::DownloadData,
            Frame::DeleteReq { .. } => FrameType::DeleteReq,
            Frame::ListServerReq { .. } => FrameType::ListServerReq,
            Frame::ListServerRes { .. } => FrameType::ListServerRes,
            Frame::ListClientReq { .. } => FrameType::ListClientReq,
            Frame::SyncEvent { .. } => FrameType::SyncEvent,
            Frame::GetSyncDir { .. } => FrameType::GetSyncDir,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Nack { .. } => FrameType::Nack,
        }
    }

    pub fn seq(&self) -> u32 {
        match self {
            Frame::UploadReq { seq, .. }
            | Frame::UploadData { seq, .. }
            | Frame::DownloadReq { seq, .. }
            | Frame::DownloadData { seq, .. }
            | Frame::DeleteReq { seq, .. }
            | Frame::ListServerReq { seq }
            | Frame::ListServerRes { seq, .. }
            | Frame::ListClientReq { seq }
            | Frame::SyncEvent { seq, .. }
            | Frame::GetSyncDir { seq, .. }
            | Frame::Ack { seq }
            | Frame::Nack { seq, .. } => *seq,
        }
    }

    /// `true` for the zero-size data frame that terminates an upload or
    /// download stream.
    pub fn is_terminator(&self) -> bool {
        match self {
            Frame::UploadData { data, .. } | Frame::DownloadData { data, .. } => data.is_empty(),
            _ => false,
        }
    }

    pub fn ack(seq: u32) -> Frame {
        Frame::Ack { seq }
    }

    pub fn nack(seq: u32, reason: impl Into<String>) -> Frame {
        Frame::Nack { seq, reason: reason.into() }
    }

    /// Checks whether a whole frame is present in `src`, returning its total
    /// byte length (header + payload) without allocating for the body.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
        FrameHeader::check(src)
    }

    /// Parses one frame. The caller must have already run `check` on the
    /// same bytes so the header and declared size are known-good.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, CodecError> {
        let header = FrameHeader::decode(src)?;
        let mut payload = vec![0u8; header.size as usize];
        src.copy_to_slice(&mut payload);

        let frame = match header.frame_type {
            FrameType::UploadReq => Frame::UploadReq { seq: header.seq, name: read_cstring(&payload)? },
            FrameType::UploadData => {
                Frame::UploadData { seq: header.seq, total: header.total, data: Bytes::from(payload) }
            }
            FrameType::DownloadReq => {
                Frame::DownloadReq { seq: header.seq, name: read_cstring(&payload)? }
            }
            FrameType::DownloadData => {
                Frame::DownloadData { seq: header.seq, total: header.total, data: Bytes::from(payload) }
            }
            FrameType::DeleteReq => Frame::DeleteReq { seq: header.seq, name: read_cstring(&payload)? },
            FrameType::ListServerReq => Frame::ListServerReq { seq: header.seq },
            FrameType::ListServerRes => {
                Frame::ListServerRes { seq: header.seq, listing: String::from_utf8(payload)? }
            }
            FrameType::ListClientReq => Frame::ListClientReq { seq: header.seq },
            FrameType::SyncEvent => Frame::SyncEvent { seq: header.seq, name: read_cstring(&payload)? },
            FrameType::GetSyncDir => {
                Frame::GetSyncDir { seq: header.seq, username: read_cstring(&payload)? }
            }
            FrameType::Ack => Frame::Ack { seq: header.seq },
            FrameType::Nack => {
                let reason = if payload.is_empty() { String::new() } else { String::from_utf8(payload)? };
                Frame::Nack { seq: header.seq, reason }
            }
        };
        Ok(frame)
    }

    /// Encodes this frame to bytes, header included, ready to write to the
    /// transport.
    pub fn encode(&self) -> Result<BytesMut, CodecError> {
        let (total, payload): (u32, Vec<u8>) = match self {
            Frame::UploadReq { name, .. }
            | Frame::DownloadReq { name, .. }
            | Frame::DeleteReq { name, .. }
            | Frame::SyncEvent { name, .. } => (1, write_cstring(name)),
            Frame::GetSyncDir { username, .. } => (1, write_cstring(username)),
            Frame::UploadData { total, data, .. } | Frame::DownloadData { total, data, .. } => {
                (*total, data.to_vec())
            }
            Frame::ListServerReq { .. } | Frame::ListClientReq { .. } | Frame::Ack { .. } => {
                (1, Vec::new())
            }
            Frame::ListServerRes { listing, .. } => (1, listing.clone().into_bytes()),
            Frame::Nack { reason, .. } => (1, reason.clone().into_bytes()),
        };

        if payload.len() as u32 > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge { size: payload.len() as u32, max: MAX_PAYLOAD });
        }

        let header = FrameHeader {
            frame_type: self.frame_type(),
            seq: self.seq(),
            total,
            size: payload.len() as u32,
        };

        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
        header.encode(&mut buf);
        buf.put_slice(&payload);
        Ok(buf)
    }
}

fn read_cstring(payload: &[u8]) -> Result<String, CodecError> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    Ok(String::from_utf8(payload[..end].to_vec())?)
}

fn write_cstring(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: Frame) {
        let encoded = frame.encode().unwrap().freeze();
        let mut cur = Cursor::new(&encoded[..]);
        let len = Frame::check(&mut cur).unwrap();
        assert_eq!(len, encoded.len());
        cur.set_position(0);
        let decoded = Frame::parse(&mut cur).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn round_trips_every_frame_kind() {
        round_trip(Frame::UploadReq { seq: 1, name: "a.txt".into() });
        round_trip(Frame::UploadData { seq: 2, total: 1, data: Bytes::from_static(b"hello") });
        round_trip(Frame::UploadData { seq: 3, total: 1, data: Bytes::new() });
        round_trip(Frame::DownloadReq { seq: 4, name: "b.txt".into() });
        round_trip(Frame::DownloadData { seq: 5, total: 1, data: Bytes::from_static(b"world") });
        round_trip(Frame::DeleteReq { seq: 6, name: "c.txt".into() });
        round_trip(Frame::ListServerReq { seq: 7 });
        round_trip(Frame::ListServerRes { seq: 8, listing: "a.txt\t3 bytes\n".into() });
        round_trip(Frame::GetSyncDir { seq: 9, username: "alice".into() });
        round_trip(Frame::Ack { seq: 10 });
        round_trip(Frame::Nack { seq: 11, reason: "bad name".into() });
    }

    #[test]
    fn terminator_is_the_zero_size_data_frame() {
        let terminator = Frame::UploadData { seq: 1, total: 1, data: Bytes::new() };
        assert!(terminator.is_terminator());
        let data = Frame::UploadData { seq: 1, total: 1, data: Bytes::from_static(b"x") };
        assert!(!data.is_terminator());
    }

    #[test]
    fn decode_errs_without_consuming_on_oversize_header() {
        let mut buf = BytesMut::new();
        let header = FrameHeader { frame_type: FrameType::UploadData, seq: 1, total: 1, size: MAX_PAYLOAD + 1 };
        header.encode(&mut buf);
        let data = buf.freeze();
        let mut cur = Cursor::new(&data[..]);
        assert!(matches!(Frame::check(&mut cur), Err(CodecError::PayloadTooLarge { .. })));
        assert_eq!(cur.position(), 0);
    }
}
