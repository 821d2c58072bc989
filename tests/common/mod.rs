use bytes::Bytes;
use filesync::connection::{self, FrameReader, FrameWriter};
use filesync::frame::Frame;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};

/// Starts a server on an ephemeral port, storing under `storage_root`. The
/// server task runs for the lifetime of the test binary's runtime.
pub async fn start_server(storage_root: PathBuf) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(filesync::server::run(listener, storage_root, std::future::pending()));
    addr
}

/// Connects and completes the handshake for `user`, returning the split
/// halves for direct frame-level driving.
pub async fn raw_connect(addr: SocketAddr, user: &str) -> (FrameReader, FrameWriter) {
    let socket = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = connection::split(socket);
    writer.write_frame(&Frame::GetSyncDir { seq: 1, username: user.to_string() }).await.unwrap();
    match reader.read_frame().await.unwrap() {
        Some(Frame::Ack { .. }) => {}
        other => panic!("expected handshake ACK, got {other:?}"),
    }
    (reader, writer)
}

/// Uploads `data` under `name` over an already-handshaken connection,
/// expecting an ACK for the request and for every chunk.
pub async fn raw_upload(reader: &mut FrameReader, writer: &mut FrameWriter, name: &str, data: &[u8]) {
    writer.write_frame(&Frame::UploadReq { seq: 1, name: name.to_string() }).await.unwrap();
    assert!(matches!(reader.read_frame().await.unwrap(), Some(Frame::Ack { .. })));

    let mut seq = 1u32;
    let mut chunks: Vec<&[u8]> = data.chunks(filesync::MAX_PAYLOAD as usize).collect();
    chunks.push(&[]);
    for chunk in chunks {
        seq += 1;
        writer
            .write_frame(&Frame::UploadData { seq, total: 1, data: Bytes::copy_from_slice(chunk) })
            .await
            .unwrap();
        if chunk.is_empty() {
            break;
        }
        match reader.read_frame().await.unwrap() {
            Some(Frame::Ack { seq: aseq }) if aseq == seq => {}
            other => panic!("expected chunk ACK, got {other:?}"),
        }
    }
}

pub async fn raw_delete(reader: &mut FrameReader, writer: &mut FrameWriter, name: &str) {
    writer.write_frame(&Frame::DeleteReq { seq: 1, name: name.to_string() }).await.unwrap();
    assert!(matches!(reader.read_frame().await.unwrap(), Some(Frame::Ack { .. })));
}
