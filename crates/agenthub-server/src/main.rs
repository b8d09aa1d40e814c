use agenthubd::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agenthubd",
    about = "Observability and coordination backbone for AI-assisted developer sessions",
    version
)]
struct Cli {
    /// Store file path (overrides AGENTHUB_DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// HTTP API port (overrides AGENTHUB_API_PORT)
    #[arg(long)]
    api_port: Option<u16>,

    /// Realtime WebSocket port (overrides AGENTHUB_REALTIME_PORT)
    #[arg(long)]
    realtime_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(api_port) = cli.api_port {
        config.api_port = api_port;
    }
    if let Some(realtime_port) = cli.realtime_port {
        config.realtime_port = realtime_port;
    }

    agenthubd::run(config).await
}
