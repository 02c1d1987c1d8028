// gitreload: webhook receiver entry point.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gitreload_daemon::config::{parse_log_level, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gitreload", about = "Sync local git mirrors and import courses on GitHub pushes")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Overrides LOG_LEVEL from the config file (DEBUG, INFO, WARNING, ERROR, CRITICAL).
    #[arg(long)]
    log_level: Option<String>,

    /// Config file to use instead of searching the default locations.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) =
        ServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(cli.log_level.as_deref(), &config)?;

    match source {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => info!("no configuration file found, using defaults"),
    }

    let addr = SocketAddr::new(cli.host, cli.port);
    gitreload_daemon::runtime::run(config, addr)
        .await
        .context("gitreload terminated unexpectedly")
}

/// `--log-level`, then `LOG_LEVEL` from the config, then `RUST_LOG`, then `info`.
fn init_tracing(flag: Option<&str>, config: &ServerConfig) -> anyhow::Result<()> {
    let directive = match flag {
        Some(level) => Some(parse_log_level(level)?),
        None => config.log_filter()?,
    };
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
