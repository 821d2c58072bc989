// ABOUTME: Watches the local sync directory for filesystem events and turns
// ABOUTME: them into upload/delete requests, applying echo suppression.

use crate::client::echo::EchoSet;
use crate::client::ops;
use crate::client::transport::Transport;
use crate::model::filename::Filename;
use crate::store::LocalStore;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Starts watching `store`'s root directory. The returned watcher must be
/// kept alive for as long as events should be delivered; dropping it stops
/// the underlying OS notification handle.
pub fn spawn(
    store: LocalStore,
    transport: Arc<Transport>,
    echo: Arc<EchoSet>,
) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::channel(256);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.blocking_send(res);
    })?;
    watcher.watch(store.root(), RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) => handle_event(event, &store, &transport, &echo).await,
                Err(e) => warn!(error = %e, "filesystem watch error"),
            }
        }
    });

    Ok(watcher)
}

async fn handle_event(event: Event, store: &LocalStore, transport: &Transport, echo: &EchoSet) {
    for path in &event.paths {
        let Some(name) = basename(path) else { continue };
        let Ok(name) = Filename::parse(name) else { continue };
        if name.is_hidden() {
            continue;
        }

        match event.kind {
            EventKind::Remove(_) => handle_remove(transport, echo, name).await,
            // `notify` can split one write into several Modify sub-kinds across
            // platforms; treating every Create/Modify as a candidate upload is
            // safe because re-uploading the same bytes is idempotent.
            EventKind::Create(_) | EventKind::Modify(_) => {
                handle_write(store, transport, echo, name).await
            }
            _ => {}
        }
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

async fn handle_remove(transport: &Transport, echo: &EchoSet, name: Filename) {
    if echo.take(&name) {
        return;
    }
    if let Err(e) = ops::delete_remote(transport, &name).await {
        warn!(%name, error = %e, "failed to propagate local delete");
    }
}

async fn handle_write(store: &LocalStore, transport: &Transport, echo: &EchoSet, name: Filename) {
    if echo.take(&name) {
        return;
    }
    let mut file = match store.open_read(&name).await {
        Ok(file) => file,
        Err(_) => return, // event fired for a file already gone (e.g. a rename-away)
    };
    if let Err(e) = ops::upload_reader(transport, &name, &mut file).await {
        warn!(%name, error = %e, "failed to upload local change");
    }
}
