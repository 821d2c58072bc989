// ABOUTME: Server accept loop, session registry, and fan-out engine wiring.
// ABOUTME: Follows the common tokio accept-with-backoff shape.

pub mod engine;
pub mod error;
pub mod fanout;
pub mod registry;

use fanout::FanoutEngine;
use registry::SessionRegistry;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub const DEFAULT_FANOUT_WORKERS: usize = 4;
const MAX_BACKOFF_SECS: u64 = 64;

/// Accepts connections and spawns one engine task per connection, retrying
/// transient accept failures with exponential backoff.
struct Listener {
    listener: TcpListener,
    storage_root: PathBuf,
    registry: Arc<SessionRegistry>,
    fanout: FanoutEngine,
}

impl Listener {
    async fn run(&mut self) -> io::Result<()> {
        info!(root = %self.storage_root.display(), "accepting connections");
        loop {
            let (socket, addr) = self.accept().await?;
            debug!(%addr, "accepted connection");
            let storage_root = self.storage_root.clone();
            let registry = Arc::clone(&self.registry);
            let fanout = self.fanout.clone();
            tokio::spawn(async move {
                engine::handle_connection(socket, storage_root, registry, fanout).await;
            });
        }
    }

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let mut backoff = 1;
        loop {
            match self.listener.accept().await {
                Ok(result) => return Ok(result),
                Err(e) if backoff <= MAX_BACKOFF_SECS => {
                    error!(error = %e, backoff, "accept failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

/// Runs the server on `listener` until `shutdown` resolves. Owns
/// the one `SessionRegistry` and `FanoutEngine` shared by every connection.
pub async fn run(listener: TcpListener, storage_root: PathBuf, shutdown: impl Future<Output = ()>) {
    run_with_workers(listener, storage_root, DEFAULT_FANOUT_WORKERS, shutdown).await
}

/// As `run`, but with an explicit fan-out worker pool size.
pub async fn run_with_workers(
    listener: TcpListener,
    storage_root: PathBuf,
    fanout_workers: usize,
    shutdown: impl Future<Output = ()>,
) {
    let registry = Arc::new(SessionRegistry::new());
    let fanout = FanoutEngine::spawn(Arc::clone(&registry), fanout_workers);
    let mut server = Listener { listener, storage_root, registry, fanout };

    tokio::select! {
        res = server.run() => {
            if let Err(e) = res {
                error!(error = %e, "accept loop terminated");
            }
        }
        _ = shutdown => {
            info!("shutdown signal received");
        }
    }
}
