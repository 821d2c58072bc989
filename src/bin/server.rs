use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// File sync server: stores one flat directory per user and fans out
/// changes to that user's other connected clients.
#[derive(Parser, Debug)]
#[command(name = "filesync-server")]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// Root directory under which `<user>/sync_dir/` is created.
    #[arg(long, default_value = "storage")]
    storage_root: PathBuf,

    /// Number of workers draining the fan-out queue.
    #[arg(long, default_value_t = filesync::server::DEFAULT_FANOUT_WORKERS)]
    fanout_workers: usize,
}

#[tokio::main]
async fn main() -> filesync::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, root = %args.storage_root.display(), "filesync-server listening");

    filesync::server::run_with_workers(listener, args.storage_root, args.fanout_workers, shutdown_signal())
        .await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
