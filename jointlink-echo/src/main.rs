//! WebSocket listener that logs joint-angle messages.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use jointlink_common::LoggingConfig;
use jointlink_echo::{DEFAULT_BIND, EchoServer};

/// Logs every WebSocket message it receives.
#[derive(Parser, Debug)]
#[command(name = "jointlink-echo")]
#[command(version)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LoggingConfig::default().with_level_override(args.log_level.as_deref());
    jointlink_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    let server = EchoServer::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(url = %format!("ws://{}", server.local_addr()?), "Starting jointlink-echo");

    tokio::select! {
        result = server.run() => {
            result.context("Listener failed")?;
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Server stopped");
        }
    }

    Ok(())
}
