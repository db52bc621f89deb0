use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mqworker::config::{default_identifier, BrokerAddr, WorkerConfig};
use mqworker::node::WorkerNode;
use mqworker::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "mqworker")]
#[command(version)]
#[command(about = "Run shell scripts on request over MQTT and stream their output back")]
struct Args {
    /// Broker addresses, tried in order (e.g. tcp://localhost:1883, ssl://host:8883)
    #[arg(required = true, value_parser = BrokerAddr::parse)]
    brokers: Vec<BrokerAddr>,

    /// Executor identifier. Hostname is used by default
    #[arg(short = 'i', long, default_value_t = default_identifier())]
    identifier: String,

    /// Directory for scripts fetched over HTTP(S)
    #[arg(long)]
    script_dir: Option<PathBuf>,

    /// Timeout for fetching a script over HTTP(S), in seconds
    #[arg(long, default_value = "60")]
    fetch_timeout_secs: u64,

    /// MQTT keep-alive interval, in seconds
    #[arg(long, default_value = "30")]
    keep_alive_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = WorkerConfig::new(args.identifier, args.brokers);
    if let Some(dir) = args.script_dir {
        config.script_dir = dir;
    }
    config.fetch_timeout = Duration::from_secs(args.fetch_timeout_secs);
    config.keep_alive = Duration::from_secs(args.keep_alive_secs);
    config.validate()?;

    tracing::info!(
        identifier = %config.identifier,
        brokers = config.brokers.len(),
        script_dir = %config.script_dir.display(),
        "Starting mqworker"
    );

    let shutdown = install_shutdown_handler();
    WorkerNode::new(config).run(shutdown).await?;

    Ok(())
}
