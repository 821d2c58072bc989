// ABOUTME: Per-connection protocol engine: handshake, then READY dispatch of
// ABOUTME: client requests interleaved with server-driven fan-out pushes.

use crate::codec::MAX_PAYLOAD;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::model::change::{Change, ChangeKind};
use crate::model::filename::Filename;
use crate::model::listing::format_listing;
use crate::server::error::ServerError;
use crate::server::fanout::FanoutEngine;
use crate::server::registry::{new_handle, push_channel, AttachResult, FanoutJob, SessionRegistry};
use crate::store::LocalStore;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Runs the full lifecycle of one accepted connection: handshake, then
/// READY dispatch until the transport closes or a fatal error occurs.
pub async fn handle_connection(
    socket: TcpStream,
    storage_root: PathBuf,
    registry: Arc<SessionRegistry>,
    fanout: FanoutEngine,
) {
    let mut conn = Connection::new(socket);
    let Some((user, handle_id, push_rx, store)) =
        handshake(&mut conn, &storage_root, &registry).await
    else {
        return;
    };

    let mut session = Session {
        conn,
        registry: Arc::clone(&registry),
        fanout,
        store,
        user,
        id: handle_id,
        push_rx,
        push_seq: 0,
    };
    session.serve().await;
    session.registry.detach(&session.user, session.id);
}

/// Performs the handshake sub-state. Returns the bound
/// username, this connection's registry id, its push job receiver, and its
/// per-user local store, or `None` if the connection should be closed.
async fn handshake(
    conn: &mut Connection,
    storage_root: &std::path::Path,
    registry: &SessionRegistry,
) -> Option<(String, u64, tokio::sync::mpsc::Receiver<FanoutJob>, LocalStore)> {
    let frame = match conn.read_frame().await {
        Ok(Some(frame)) => frame,
        _ => return None,
    };

    let Frame::GetSyncDir { seq, username } = frame else {
        debug!("first frame was not GET_SYNC_DIR; closing");
        return None;
    };

    if username.is_empty() || username.len() > 255 {
        let _ = conn.write_frame(&Frame::nack(seq, "invalid username")).await;
        return None;
    }

    let store = LocalStore::new(storage_root.join(&username).join("sync_dir"));
    if store.ensure_dir().await.is_err() {
        let _ = conn.write_frame(&Frame::nack(seq, "could not prepare sync directory")).await;
        return None;
    }

    let (tx, rx) = push_channel();
    let handle = new_handle(tx);
    let id = handle.id;

    match registry.attach(&username, handle) {
        AttachResult::Full => {
            let _ = conn.write_frame(&Frame::nack(seq, "session full")).await;
            None
        }
        AttachResult::Ok => {
            if conn.write_frame(&Frame::ack(seq)).await.is_err() {
                registry.detach(&username, id);
                return None;
            }
            info!(%username, "client bound");
            Some((username, id, rx, store))
        }
    }
}

struct Session {
    conn: Connection,
    registry: Arc<SessionRegistry>,
    fanout: FanoutEngine,
    store: LocalStore,
    user: String,
    id: u64,
    push_rx: tokio::sync::mpsc::Receiver<FanoutJob>,
    push_seq: u32,
}

impl Session {
    async fn serve(&mut self) {
        loop {
            tokio::select! {
                frame = self.conn.read_frame() => {
                    match frame {
                        Ok(Some(frame)) => {
                            if let Err(e) = self.dispatch(frame).await {
                                warn!(user = %self.user, error = %e, "request handling failed");
                                if e.is_fatal() {
                                    break;
                                }
                            }
                        }
                        Ok(None) => {
                            debug!(user = %self.user, "connection closed cleanly");
                            break;
                        }
                        Err(e) => {
                            warn!(user = %self.user, error = %e, "transport error");
                            break;
                        }
                    }
                }
                job = self.push_rx.recv() => {
                    let Some(FanoutJob::Push(change)) = job else { continue };
                    if let Err(e) = self.perform_push(change).await {
                        warn!(user = %self.user, error = %e, "push to peer failed");
                        if e.is_fatal() {
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), ServerError> {
        match frame {
            Frame::GetSyncDir { seq, .. } => {
                self.conn.write_frame(&Frame::ack(seq)).await?;
                Ok(())
            }
            Frame::UploadReq { seq, name } => self.handle_upload(seq, name).await,
            Frame::DownloadReq { seq, name } => self.handle_download(seq, name).await,
            Frame::DeleteReq { seq, name } => self.handle_delete(seq, name).await,
            Frame::ListServerReq { seq } => self.handle_list(seq).await,
            Frame::SyncEvent { .. } => Ok(()), // clients MUST NOT send this; ignore silently
            other => {
                self.conn.write_frame(&Frame::nack(other.seq(), "unexpected frame in READY state")).await?;
                Ok(())
            }
        }
    }

    async fn handle_upload(&mut self, seq: u32, raw_name: String) -> Result<(), ServerError> {
        let name = match Filename::parse(raw_name) {
            Ok(name) => name,
            Err(e) => {
                self.conn.write_frame(&Frame::nack(seq, e.to_string())).await?;
                return Ok(());
            }
        };

        let mut pending = match self.store.open_write(&name).await {
            Ok(pending) => pending,
            Err(_) => {
                self.conn.write_frame(&Frame::nack(seq, "could not open file for writing")).await?;
                return Ok(());
            }
        };
        self.conn.write_frame(&Frame::ack(seq)).await?;

        loop {
            match self.conn.read_frame().await? {
                Some(Frame::UploadData { data, .. }) if data.is_empty() => {
                    pending.commit().await?;
                    self.fanout.submit(Change::upload(self.user.clone(), name.clone()), self.id).await;
                    return Ok(());
                }
                Some(Frame::UploadData { seq: dseq, data, .. }) => {
                    if let Err(e) = pending.write_all(&data).await {
                        let _ = pending.abort().await;
                        return Err(e.into());
                    }
                    self.conn.write_frame(&Frame::ack(dseq)).await?;
                }
                Some(_) => {
                    let _ = pending.abort().await;
                    return Err(ServerError::UnexpectedFrame);
                }
                None => {
                    let _ = pending.abort().await;
                    return Err(ServerError::Transport(crate::connection::TransportError::ResetMidFrame));
                }
            }
        }
    }

    async fn handle_download(&mut self, seq: u32, raw_name: String) -> Result<(), ServerError> {
        let name = match Filename::parse(raw_name) {
            Ok(name) => name,
            Err(e) => {
                self.conn.write_frame(&Frame::nack(seq, e.to_string())).await?;
                return Ok(());
            }
        };

        let mut file = match self.store.open_read(&name).await {
            Ok(file) => file,
            Err(_) => {
                self.conn.write_frame(&Frame::nack(seq, "no such file")).await?;
                return Ok(());
            }
        };
        self.conn.write_frame(&Frame::ack(seq)).await?;

        let mut buf = vec![0u8; MAX_PAYLOAD as usize];
        let mut dseq = 1u32;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                self.conn
                    .write_frame(&Frame::DownloadData { seq: dseq, total: 1, data: Bytes::new() })
                    .await?;
                return Ok(());
            }
            let data = Bytes::copy_from_slice(&buf[..n]);
            self.conn.write_frame(&Frame::DownloadData { seq: dseq, total: 1, data }).await?;

            match self.conn.read_frame().await? {
                Some(Frame::Ack { seq: aseq }) if aseq == dseq => {}
                _ => {
                    warn!(user = %self.user, %name, "download aborted: peer did not ack");
                    return Ok(());
                }
            }
            dseq += 1;
        }
    }

    async fn handle_delete(&mut self, seq: u32, raw_name: String) -> Result<(), ServerError> {
        let name = match Filename::parse(raw_name) {
            Ok(name) => name,
            Err(e) => {
                self.conn.write_frame(&Frame::nack(seq, e.to_string())).await?;
                return Ok(());
            }
        };

        match self.store.delete(&name).await {
            Ok(()) => {
                self.conn.write_frame(&Frame::ack(seq)).await?;
                self.fanout.submit(Change::delete(self.user.clone(), name), self.id).await;
                Ok(())
            }
            Err(_) => {
                self.conn.write_frame(&Frame::nack(seq, "delete failed")).await?;
                Ok(())
            }
        }
    }

    async fn handle_list(&mut self, seq: u32) -> Result<(), ServerError> {
        let entries = self.store.list().await.unwrap_or_default();
        let listing = format_listing(&entries);
        self.conn.write_frame(&Frame::ListServerRes { seq, listing }).await?;
        Ok(())
    }

    fn next_push_seq(&mut self) -> u32 {
        self.push_seq += 1;
        self.push_seq
    }

    async fn perform_push(&mut self, change: Change) -> Result<(), ServerError> {
        match change.kind {
            ChangeKind::Upload => self.push_upload(change.name).await,
            ChangeKind::Delete => self.push_delete(change.name).await,
        }
    }

    async fn push_upload(&mut self, name: Filename) -> Result<(), ServerError> {
        let mut file = match self.store.open_read(&name).await {
            Ok(file) => file,
            Err(_) => return Ok(()), // gone by the time fan-out reached us; skip
        };

        let seq = self.next_push_seq();
        self.conn.write_frame(&Frame::UploadReq { seq, name: name.as_str().to_string() }).await?;
        if !self.await_push_ack(seq).await? {
            return Ok(()); // peer failed to ack the push request; skip it
        }

        let mut buf = vec![0u8; MAX_PAYLOAD as usize];
        loop {
            let n = file.read(&mut buf).await?;
            let dseq = self.next_push_seq();
            let data = Bytes::copy_from_slice(&buf[..n]);
            self.conn.write_frame(&Frame::UploadData { seq: dseq, total: 1, data }).await?;
            if n == 0 {
                return Ok(());
            }
            if !self.await_push_ack(dseq).await? {
                return Ok(()); // peer failed to ack a chunk; skip the rest
            }
        }
    }

    async fn push_delete(&mut self, name: Filename) -> Result<(), ServerError> {
        let seq = self.next_push_seq();
        self.conn.write_frame(&Frame::DeleteReq { seq, name: name.as_str().to_string() }).await?;
        // Failure to ACK does not undo the originating delete.
        let _ = self.await_push_ack(seq).await;
        Ok(())
    }

    /// Waits for the ack of a push frame the server just sent, but a push
    /// shares the wire with the client's own requests: a watcher-issued
    /// request can land ahead of the ack it raced against the same gate on
    /// the client side. Any genuine request frame seen here is dispatched in
    /// place (so the client isn't starved while this connection is mid-push)
    /// and the wait for the real ack continues. Anything else in place of
    /// the expected ack means the push failed.
    async fn await_push_ack(&mut self, expected_seq: u32) -> Result<bool, ServerError> {
        loop {
            match self.conn.read_frame().await? {
                Some(Frame::Ack { seq }) if seq == expected_seq => return Ok(true),
                Some(
                    frame @ (Frame::UploadReq { .. }
                    | Frame::DownloadReq { .. }
                    | Frame::DeleteReq { .. }
                    | Frame::ListServerReq { .. }
                    | Frame::GetSyncDir { .. }),
                ) => {
                    if let Err(e) = self.dispatch(frame).await {
                        warn!(user = %self.user, error = %e, "request interleaved with a push failed");
                        if e.is_fatal() {
                            return Err(e);
                        }
                    }
                }
                _ => return Ok(false),
            }
        }
    }
}
