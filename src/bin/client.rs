use clap::Parser;
use filesync::client::Session;
use tracing_subscriber::EnvFilter;

/// File sync client: connects to a server, reconciles its local mirror, then
/// keeps it in sync while an interactive prompt accepts commands.
#[derive(Parser, Debug)]
#[command(name = "filesync-client")]
struct Args {
    user: String,
    host: String,
    port: u16,
}

#[tokio::main]
async fn main() -> filesync::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let sync_dir = std::env::current_dir()?.join(format!("sync_dir_{}", args.user));

    let session = Session::connect(&args.host, args.port, &args.user, sync_dir).await?;
    filesync::client::cli::run(&session).await;
    Ok(())
}
