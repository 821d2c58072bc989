// ABOUTME: The handful of request/response exchanges a client can issue:
// ABOUTME: upload, download, delete, list. Shared by the watcher, the
// ABOUTME: reconciler, and the interactive driver so each is implemented once.

use crate::client::error::SyncError;
use crate::client::transport::Transport;
use crate::codec::MAX_PAYLOAD;
use crate::frame::Frame;
use crate::model::filename::Filename;
use crate::model::listing::{parse_listing, ListedFile};
use crate::store::LocalStore;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

/// Streams `reader`'s bytes to the server as a new file named `name`,
/// acknowledging each chunk before sending the next.
pub async fn upload_reader<R: AsyncRead + Unpin>(
    transport: &Transport,
    name: &Filename,
    reader: &mut R,
) -> Result<(), SyncError> {
    let mut exchange = transport.begin_exchange().await;
    exchange.send(&Frame::UploadReq { seq: 1, name: name.as_str().to_string() }).await?;
    match exchange.recv().await {
        Some(Frame::Ack { .. }) => {}
        Some(Frame::Nack { reason, .. }) => return Err(SyncError::Rejected(reason)),
        _ => return Err(SyncError::UnexpectedFrame),
    }

    let mut buf = vec![0u8; MAX_PAYLOAD as usize];
    let mut seq = 1u32;
    loop {
        let n = reader.read(&mut buf).await?;
        seq += 1;
        let data = Bytes::copy_from_slice(&buf[..n]);
        exchange.send(&Frame::UploadData { seq, total: 1, data }).await?;
        if n == 0 {
            return Ok(());
        }
        match exchange.recv().await {
            Some(Frame::Ack { seq: aseq }) if aseq == seq => {}
            _ => return Err(SyncError::UnexpectedFrame),
        }
    }
}

/// Pulls `name` from the server into `store`, acknowledging each chunk.
pub async fn download_file(
    transport: &Transport,
    store: &LocalStore,
    name: &Filename,
) -> Result<(), SyncError> {
    let mut exchange = transport.begin_exchange().await;
    exchange.send(&Frame::DownloadReq { seq: 1, name: name.as_str().to_string() }).await?;
    match exchange.recv().await {
        Some(Frame::Ack { .. }) => {}
        Some(Frame::Nack { reason, .. }) => return Err(SyncError::Rejected(reason)),
        _ => return Err(SyncError::UnexpectedFrame),
    }

    let mut pending = store.open_write(name).await?;
    loop {
        match exchange.recv().await {
            Some(Frame::DownloadData { data, .. }) if data.is_empty() => {
                pending.commit().await?;
                return Ok(());
            }
            Some(Frame::DownloadData { seq, data, .. }) => {
                pending.write_all(&data).await?;
                exchange.send(&Frame::ack(seq)).await?;
            }
            _ => {
                let _ = pending.abort().await;
                return Err(SyncError::UnexpectedFrame);
            }
        }
    }
}

pub async fn delete_remote(transport: &Transport, name: &Filename) -> Result<(), SyncError> {
    let mut exchange = transport.begin_exchange().await;
    exchange.send(&Frame::DeleteReq { seq: 1, name: name.as_str().to_string() }).await?;
    match exchange.recv().await {
        Some(Frame::Ack { .. }) => Ok(()),
        Some(Frame::Nack { reason, .. }) => Err(SyncError::Rejected(reason)),
        _ => Err(SyncError::UnexpectedFrame),
    }
}

pub async fn list_server(transport: &Transport) -> Result<Vec<ListedFile>, SyncError> {
    let mut exchange = transport.begin_exchange().await;
    exchange.send(&Frame::ListServerReq { seq: 1 }).await?;
    match exchange.recv().await {
        Some(Frame::ListServerRes { listing, .. }) => Ok(parse_listing(&listing)),
        _ => Err(SyncError::UnexpectedFrame),
    }
}

pub async fn get_sync_dir(transport: &Transport, username: &str) -> Result<(), SyncError> {
    let mut exchange = transport.begin_exchange().await;
    exchange.send(&Frame::GetSyncDir { seq: 1, username: username.to_string() }).await?;
    match exchange.recv().await {
        Some(Frame::Ack { .. }) => Ok(()),
        Some(Frame::Nack { reason, .. }) => Err(SyncError::Rejected(reason)),
        _ => Err(SyncError::UnexpectedFrame),
    }
}
