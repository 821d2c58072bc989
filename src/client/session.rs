// ABOUTME: Orchestrates one client's lifetime: connect, handshake, initial
// ABOUTME: reconciliation, then hands the transport to the listener and
// ABOUTME: watcher for the rest of the session.

use crate::client::echo::EchoSet;
use crate::client::error::SyncError;
use crate::client::transport::Transport;
use crate::client::{listener, ops, reconciler, watcher};
use crate::connection;
use crate::frame::Frame;
use crate::model::filename::Filename;
use crate::model::listing::ListedFile;
use crate::store::LocalStore;
use notify::RecommendedWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::info;

const ECHO_TTL: Duration = Duration::from_secs(5);

/// An established, reconciled client session. Holds the watcher handle so it
/// isn't dropped (and torn down) while the session is alive.
pub struct Session {
    pub transport: Arc<Transport>,
    pub store: LocalStore,
    pub username: String,
    echo: Arc<EchoSet>,
    _watcher: RecommendedWatcher,
}

impl Session {
    pub async fn connect(host: &str, port: u16, username: &str, sync_dir: PathBuf) -> Result<Self, SyncError> {
        let socket = TcpStream::connect((host, port)).await?;
        let (mut reader, mut writer) = connection::split(socket);

        writer.write_frame(&Frame::GetSyncDir { seq: 1, username: username.to_string() }).await?;
        match reader.read_frame().await? {
            Some(Frame::Ack { .. }) => {}
            Some(Frame::Nack { reason, .. }) => return Err(SyncError::Rejected(reason)),
            _ => return Err(SyncError::UnexpectedFrame),
        }
        info!(%username, "handshake complete");

        let store = LocalStore::new(sync_dir);
        store.ensure_dir().await?;

        let transport = Arc::new(Transport::new(writer));
        reconciler::reconcile(&transport, &store).await?;
        info!("initial reconciliation complete");

        let echo = Arc::new(EchoSet::new(ECHO_TTL));
        tokio::spawn(listener::run(reader, Arc::clone(&transport), store.clone(), Arc::clone(&echo)));
        let watcher = watcher::spawn(store.clone(), Arc::clone(&transport), Arc::clone(&echo))
            .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))?;

        Ok(Session { transport, store, username: username.to_string(), echo, _watcher: watcher })
    }

    pub async fn upload_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(SyncError::InvalidPath)?;
        let name = Filename::parse(file_name)?;
        let mut file = tokio::fs::File::open(path).await?;
        ops::upload_reader(&self.transport, &name, &mut file).await
    }

    pub async fn download(&self, name: &str) -> Result<(), SyncError> {
        let name = Filename::parse(name)?;
        // Mark before writing so the watcher swallows the resulting local
        // event instead of echoing it back as a redundant UPLOAD_REQ.
        self.echo.mark(name.clone());
        ops::download_file(&self.transport, &self.store, &name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), SyncError> {
        let name = Filename::parse(name)?;
        // Mark before the local delete so the watcher swallows the resulting
        // local event instead of echoing it back as a redundant DELETE_REQ.
        self.echo.mark(name.clone());
        self.store.delete(&name).await?;
        ops::delete_remote(&self.transport, &name).await
    }

    pub async fn list_server(&self) -> Result<Vec<ListedFile>, SyncError> {
        ops::list_server(&self.transport).await
    }

    pub async fn list_client(&self) -> Result<Vec<ListedFile>, SyncError> {
        let entries = self.store.list().await?;
        Ok(entries.into_iter().map(|e| ListedFile { name: e.name.into_string(), size: e.size }).collect())
    }

    pub async fn get_sync_dir(&self) -> Result<(), SyncError> {
        ops::get_sync_dir(&self.transport, &self.username).await
    }
}
