//! QAProbe Web Dashboard - Binary entry point

use clap::Parser;
use qaprobe_web::{Config, serve};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "qaprobe-web", version, about = "QAProbe testing dashboard server")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Directory for persisted config and results
    #[arg(long, default_value = ".qaprobe")]
    data_dir: PathBuf,

    /// Directory of static frontend files (serves the embedded page when unset)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Path to the browser agent binary
    #[arg(long)]
    agent_binary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qaprobe_web=info,qaprobe_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config {
        port: cli.port,
        data_dir: cli.data_dir,
        static_dir: cli.static_dir,
        agent_binary: cli.agent_binary,
    };

    tracing::info!(
        "Starting QAProbe dashboard on http://localhost:{}",
        config.port
    );

    serve(config).await?;

    Ok(())
}
