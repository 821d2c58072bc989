// ABOUTME: Sole reader of the client transport once reconciliation is done.
// ABOUTME: Services server-initiated pushes directly and demuxes everything
// ABOUTME: else to whichever component has an exchange open.

use crate::client::echo::EchoSet;
use crate::client::error::SyncError;
use crate::client::transport::Transport;
use crate::connection::{FrameReader, RecvDeadlineError};
use crate::frame::Frame;
use crate::model::filename::Filename;
use crate::store::LocalStore;
use std::time::Duration;
use tracing::{debug, info, warn};

const RECV_DEADLINE: Duration = Duration::from_millis(500);

pub async fn run(mut reader: FrameReader, transport: std::sync::Arc<Transport>, store: LocalStore, echo: std::sync::Arc<EchoSet>) {
    loop {
        match reader.read_frame_deadline(RECV_DEADLINE).await {
            Ok(Some(frame)) => handle_frame(frame, &mut reader, &transport, &store, &echo).await,
            Ok(None) => {
                info!("server closed the connection");
                break;
            }
            Err(RecvDeadlineError::TimedOut) => continue,
            Err(RecvDeadlineError::Transport(e)) => {
                warn!(error = %e, "listener transport error");
                break;
            }
        }
    }
}

async fn handle_frame(
    frame: Frame,
    reader: &mut FrameReader,
    transport: &Transport,
    store: &LocalStore,
    echo: &EchoSet,
) {
    match frame {
        Frame::UploadReq { seq, name } => {
            let Ok(name) = Filename::parse(name) else {
                let _ = write_direct(transport, &Frame::nack(seq, "invalid filename")).await;
                return;
            };
            echo.mark(name.clone());
            if let Err(e) = receive_push_upload(reader, transport, store, seq, &name).await {
                warn!(%name, error = %e, "push upload failed");
                echo.take(&name);
            }
        }
        Frame::DeleteReq { seq, name } => {
            let Ok(name) = Filename::parse(name) else {
                let _ = write_direct(transport, &Frame::nack(seq, "invalid filename")).await;
                return;
            };
            echo.mark(name.clone());
            let _ = store.delete(&name).await;
            let _ = write_direct(transport, &Frame::ack(seq)).await;
        }
        Frame::Ack { .. } | Frame::Nack { .. } | Frame::DownloadData { .. } | Frame::ListServerRes { .. } => {
            if !transport.forward_to_pending(frame).await {
                debug!("dropping stray response frame: no outstanding request");
            }
        }
        other => {
            debug!(frame_type = ?other.frame_type(), "ignoring frame unexpected from the server");
        }
    }
}

/// The listener writes directly rather than through an `Exchange`: pushes
/// are server-initiated and never contend with a client-issued request for
/// the response slot, only for the write-serialization mutex.
async fn write_direct(transport: &Transport, frame: &Frame) -> Result<(), SyncError> {
    transport.begin_exchange().await.send(frame).await
}

async fn receive_push_upload(
    reader: &mut FrameReader,
    transport: &Transport,
    store: &LocalStore,
    seq: u32,
    name: &Filename,
) -> Result<(), SyncError> {
    let mut pending = match store.open_write(name).await {
        Ok(pending) => pending,
        Err(e) => {
            write_direct(transport, &Frame::nack(seq, "could not open file for writing")).await?;
            return Err(e.into());
        }
    };
    write_direct(transport, &Frame::ack(seq)).await?;

    loop {
        match reader.read_frame().await? {
            Some(Frame::UploadData { data, .. }) if data.is_empty() => {
                pending.commit().await?;
                return Ok(());
            }
            Some(Frame::UploadData { seq: dseq, data, .. }) => {
                pending.write_all(&data).await?;
                write_direct(transport, &Frame::ack(dseq)).await?;
            }
            _ => {
                let _ = pending.abort().await;
                return Err(SyncError::UnexpectedFrame);
            }
        }
    }
}
