// ABOUTME: Initial reconciliation: pull every file the server has that is
// ABOUTME: missing locally or differs in size, before the watcher starts.

use crate::client::error::SyncError;
use crate::client::ops;
use crate::client::transport::Transport;
use crate::model::filename::Filename;
use crate::store::LocalStore;
use tracing::warn;

pub async fn reconcile(transport: &Transport, store: &LocalStore) -> Result<(), SyncError> {
    let server_files = ops::list_server(transport).await?;

    for file in server_files {
        let Ok(name) = Filename::parse(file.name) else { continue };
        if local_size(store, &name).await == Some(file.size) {
            continue;
        }
        if let Err(e) = ops::download_file(transport, store, &name).await {
            warn!(%name, error = %e, "reconciliation download failed");
        }
    }
    Ok(())
}

async fn local_size(store: &LocalStore, name: &Filename) -> Option<u64> {
    tokio::fs::metadata(store.path_for(name)).await.ok().map(|m| m.len())
}
