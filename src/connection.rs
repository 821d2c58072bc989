// ABOUTME: Frame-based I/O over a TCP stream, built around a buffered
// ABOUTME: Connection type for this crate's length-delimited sync frames.

use crate::codec::CodecError;
use crate::frame::Frame;
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection reset by peer mid-frame")]
    ResetMidFrame,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Attempts to parse one frame out of `buffer`, discarding the consumed
/// bytes on success. Shared by both the full-duplex server `Connection` and
/// the client's split `FrameReader`, so the parsing logic lives in one place.
fn parse_buffered_frame(buffer: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    let mut buf = Cursor::new(&buffer[..]);
    match Frame::check(&mut buf) {
        Ok(len) => {
            buf.set_position(0);
            let frame = Frame::parse(&mut buf)?;
            buffer.advance(len);
            Ok(Some(frame))
        }
        Err(CodecError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn fill_and_parse<R: AsyncRead + Unpin>(
    stream: &mut R,
    buffer: &mut BytesMut,
) -> Result<Option<Frame>, TransportError> {
    loop {
        if let Some(frame) = parse_buffered_frame(buffer)? {
            return Ok(Some(frame));
        }
        if 0 == stream.read_buf(buffer).await? {
            return if buffer.is_empty() {
                Ok(None)
            } else {
                Err(TransportError::ResetMidFrame)
            };
        }
    }
}

/// Full-duplex frame transport for a single accepted connection. The server
/// protocol engine is the sole owner of a `Connection`: it both reads client
/// requests and writes responses/pushes from the same task.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection { stream: BufWriter::new(socket), buffer: BytesMut::with_capacity(4 * 1024) }
    }

    /// Reads one frame, blocking until a full frame is buffered or the
    /// stream closes cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        fill_and_parse(&mut self.stream, &mut self.buffer).await
    }

    /// As `read_frame`, but fails with a timeout rather than blocking
    /// forever, so callers that must stay responsive to shutdown can poll.
    pub async fn read_frame_deadline(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, RecvDeadlineError> {
        match tokio::time::timeout(timeout, self.read_frame()).await {
            Ok(result) => result.map_err(RecvDeadlineError::Transport),
            Err(_) => Err(RecvDeadlineError::TimedOut),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let encoded = frame.encode()?;
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecvDeadlineError {
    #[error("recv timed out")]
    TimedOut,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The client's read half, used exclusively by one component at a time: the
/// `Reconciler` during initial sync, then the `Listener` for the life of the
/// session.
#[derive(Debug)]
pub struct FrameReader {
    stream: OwnedReadHalf,
    buffer: BytesMut,
}

impl FrameReader {
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        fill_and_parse(&mut self.stream, &mut self.buffer).await
    }

    pub async fn read_frame_deadline(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, RecvDeadlineError> {
        match tokio::time::timeout(timeout, self.read_frame()).await {
            Ok(result) => result.map_err(RecvDeadlineError::Transport),
            Err(_) => Err(RecvDeadlineError::TimedOut),
        }
    }
}

/// The client's write half. Shared behind a `tokio::sync::Mutex` so the
/// watcher, the interactive CLI, and the reconciler can each issue a request
/// without two writes ever interleaving on the wire.
#[derive(Debug)]
pub struct FrameWriter {
    stream: BufWriter<OwnedWriteHalf>,
}

impl FrameWriter {
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let encoded = frame.encode()?;
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Splits a connected stream into the two halves described above.
pub fn split(socket: TcpStream) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = socket.into_split();
    (
        FrameReader { stream: read_half, buffer: BytesMut::with_capacity(4 * 1024) },
        FrameWriter { stream: BufWriter::new(write_half) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connection_round_trips_a_frame_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(socket);
            let frame = conn.read_frame().await.unwrap().unwrap();
            conn.write_frame(&frame).await.unwrap();
        });

        let client_socket = TcpStream::connect(addr).await.unwrap();
        let mut client = Connection::new(client_socket);
        let sent = Frame::GetSyncDir { seq: 1, username: "alice".into() };
        client.write_frame(&sent).await.unwrap();
        let echoed = client.read_frame().await.unwrap().unwrap();
        assert_eq!(sent, echoed);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn split_reader_writer_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(socket);
            let frame = conn.read_frame().await.unwrap().unwrap();
            conn.write_frame(&frame).await.unwrap();
        });

        let client_socket = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = split(client_socket);
        let sent = Frame::Ack { seq: 42 };
        writer.write_frame(&sent).await.unwrap();
        let echoed = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(sent, echoed);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_frame_deadline_times_out_on_silence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _keep_alive = socket;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let client_socket = TcpStream::connect(addr).await.unwrap();
        let mut conn = Connection::new(client_socket);
        let result = conn.read_frame_deadline(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(RecvDeadlineError::TimedOut)));

        server.await.unwrap();
    }
}
