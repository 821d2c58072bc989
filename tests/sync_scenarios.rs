mod common;

use common::{raw_connect, raw_delete, raw_upload, start_server};
use filesync::client::Session;
use filesync::frame::Frame;
use filesync::model::listing::parse_listing;
use tempfile::tempdir;

/// S1: upload then download. A second device for the same user, connecting
/// afterwards, reconciles to an identical file.
#[tokio::test]
async fn upload_then_reconcile_downloads_the_file() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;

    let (mut reader, mut writer) = raw_connect(addr, "alice").await;
    raw_upload(&mut reader, &mut writer, "hello.txt", b"hi\n").await;

    writer.write_frame(&Frame::ListServerReq { seq: 1 }).await.unwrap();
    let listing = match reader.read_frame().await.unwrap() {
        Some(Frame::ListServerRes { listing, .. }) => listing,
        other => panic!("expected listing, got {other:?}"),
    };
    let entries = parse_listing(&listing);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hello.txt");
    assert_eq!(entries[0].size, 3);

    let client_dir = tempdir().unwrap();
    let session = Session::connect("127.0.0.1", addr.port(), "alice", client_dir.path().to_path_buf())
        .await
        .unwrap();
    let bytes = tokio::fs::read(client_dir.path().join("hello.txt")).await.unwrap();
    assert_eq!(bytes, b"hi\n");
    drop(session);
}

/// S2: fan-out. A change uploaded on one connection is pushed, byte for
/// byte, to every other connection of the same user.
#[tokio::test]
async fn upload_fans_out_to_the_other_connection() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;

    let (mut r1, mut w1) = raw_connect(addr, "bob").await;
    let (mut r2, mut w2) = raw_connect(addr, "bob").await;

    let payload = b"ABCDEFGH".to_vec();
    raw_upload(&mut r1, &mut w1, "a.bin", &payload).await;

    let mut received = Vec::new();
    match tokio::time::timeout(std::time::Duration::from_secs(2), r2.read_frame()).await {
        Ok(Ok(Some(Frame::UploadReq { seq, name }))) => {
            assert_eq!(name, "a.bin");
            w2.write_frame(&Frame::ack(seq)).await.unwrap();
        }
        other => panic!("expected an UploadReq push, got {other:?}"),
    }

    loop {
        match tokio::time::timeout(std::time::Duration::from_secs(2), r2.read_frame()).await {
            Ok(Ok(Some(Frame::UploadData { data, .. }))) if data.is_empty() => break,
            Ok(Ok(Some(Frame::UploadData { seq, data, .. }))) => {
                received.extend_from_slice(&data);
                w2.write_frame(&Frame::ack(seq)).await.unwrap();
            }
            other => panic!("expected UploadData push, got {other:?}"),
        }
    }
    assert_eq!(received, payload);
}

/// S3: delete propagation.
#[tokio::test]
async fn delete_fans_out_to_the_other_connection() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;

    let (mut r1, mut w1) = raw_connect(addr, "carol").await;
    let (mut r2, mut w2) = raw_connect(addr, "carol").await;

    raw_upload(&mut r1, &mut w1, "a.bin", b"xyz").await;
    match tokio::time::timeout(std::time::Duration::from_secs(2), r2.read_frame()).await {
        Ok(Ok(Some(Frame::UploadReq { seq, .. }))) => {
            w2.write_frame(&Frame::ack(seq)).await.unwrap();
        }
        other => panic!("expected push of a.bin, got {other:?}"),
    }
    loop {
        match r2.read_frame().await.unwrap() {
            Some(Frame::UploadData { seq, data, .. }) if data.is_empty() => {
                let _ = seq;
                break;
            }
            Some(Frame::UploadData { seq, .. }) => {
                w2.write_frame(&Frame::ack(seq)).await.unwrap();
            }
            other => panic!("expected UploadData, got {other:?}"),
        }
    }

    raw_delete(&mut r1, &mut w1, "a.bin").await;
    match tokio::time::timeout(std::time::Duration::from_secs(2), r2.read_frame()).await {
        Ok(Ok(Some(Frame::DeleteReq { seq, name }))) => {
            assert_eq!(name, "a.bin");
            w2.write_frame(&Frame::ack(seq)).await.unwrap();
        }
        other => panic!("expected a delete push, got {other:?}"),
    }
}

/// S4: a third simultaneous connection for the same user is refused.
#[tokio::test]
async fn third_connection_is_refused_and_closed() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;

    let _first = raw_connect(addr, "dana").await;
    let _second = raw_connect(addr, "dana").await;

    let socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = filesync::connection::split(socket);
    writer.write_frame(&Frame::GetSyncDir { seq: 1, username: "dana".to_string() }).await.unwrap();
    match reader.read_frame().await.unwrap() {
        Some(Frame::Nack { .. }) => {}
        other => panic!("expected NACK for the third connection, got {other:?}"),
    }
    assert!(reader.read_frame().await.unwrap().is_none(), "server should close after the NACK");
}

/// S5: a filename escaping the flat directory is rejected outright.
#[tokio::test]
async fn bad_filename_is_rejected_and_creates_nothing() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;
    let (mut reader, mut writer) = raw_connect(addr, "erin").await;

    writer.write_frame(&Frame::UploadReq { seq: 1, name: "../secret".to_string() }).await.unwrap();
    match reader.read_frame().await.unwrap() {
        Some(Frame::Nack { .. }) => {}
        other => panic!("expected NACK for a path-escaping name, got {other:?}"),
    }

    writer.write_frame(&Frame::ListServerReq { seq: 2 }).await.unwrap();
    let listing = match reader.read_frame().await.unwrap() {
        Some(Frame::ListServerRes { listing, .. }) => listing,
        other => panic!("expected listing, got {other:?}"),
    };
    assert!(!listing.contains("secret"));
}

/// S6: a newly connecting client reconciles every server file before any
/// user command is issued.
#[tokio::test]
async fn new_client_reconciles_existing_server_files_on_connect() {
    let storage = tempdir().unwrap();
    let addr = start_server(storage.path().to_path_buf()).await;

    let (mut reader, mut writer) = raw_connect(addr, "frank").await;
    raw_upload(&mut reader, &mut writer, "x.dat", &vec![7u8; 1000]).await;
    raw_upload(&mut reader, &mut writer, "y.dat", &[]).await;

    let client_dir = tempdir().unwrap();
    let _session =
        Session::connect("127.0.0.1", addr.port(), "frank", client_dir.path().to_path_buf()).await.unwrap();

    let x = tokio::fs::metadata(client_dir.path().join("x.dat")).await.unwrap();
    let y = tokio::fs::metadata(client_dir.path().join("y.dat")).await.unwrap();
    assert_eq!(x.len(), 1000);
    assert_eq!(y.len(), 0);
}
