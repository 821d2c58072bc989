// ABOUTME: The client's shared write half plus response demultiplexing.
// ABOUTME: Only the listener ever reads; everyone else requests through here.

use crate::client::error::SyncError;
use crate::connection::FrameWriter;
use crate::frame::Frame;
use tokio::sync::{mpsc, Mutex};

/// Serializes writes from the watcher, the interactive driver, and the
/// reconciler onto one transport, and gives each of them a channel the
/// listener can forward the matching response frames into.
///
/// At most one exchange is open at a time: `begin_exchange` blocks until any
/// prior exchange has finished, so a response frame is never ambiguous about
/// which caller it belongs to.
pub struct Transport {
    writer: Mutex<FrameWriter>,
    gate: Mutex<()>,
    pending: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl Transport {
    pub fn new(writer: FrameWriter) -> Self {
        Transport { writer: Mutex::new(writer), gate: Mutex::new(()), pending: Mutex::new(None) }
    }

    async fn write(&self, frame: &Frame) -> Result<(), SyncError> {
        let mut writer = self.writer.lock().await;
        writer.write_frame(frame).await?;
        Ok(())
    }

    /// Opens a request/response exchange. Held until dropped, so callers
    /// should keep it alive for the whole multi-frame interaction (an
    /// upload's chunk-by-chunk acks, or a download's data frames).
    pub async fn begin_exchange(&self) -> Exchange<'_> {
        let permit = self.gate.lock().await;
        let (tx, rx) = mpsc::channel(8);
        *self.pending.lock().await = Some(tx);
        Exchange { transport: self, _permit: permit, rx }
    }

    /// Called by the listener for every frame that isn't a server-initiated
    /// push. Returns `false` if nothing is currently waiting for it, in
    /// which case the caller should log and drop the frame.
    pub async fn forward_to_pending(&self, frame: Frame) -> bool {
        let pending = self.pending.lock().await;
        match pending.as_ref() {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }
}

pub struct Exchange<'a> {
    transport: &'a Transport,
    _permit: tokio::sync::MutexGuard<'a, ()>,
    rx: mpsc::Receiver<Frame>,
}

impl<'a> Exchange<'a> {
    pub async fn send(&self, frame: &Frame) -> Result<(), SyncError> {
        self.transport.write(frame).await
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl<'a> Drop for Exchange<'a> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.transport.pending.try_lock() {
            *pending = None;
        }
    }
}
