//! hived — the Hive node daemon.
//!
//! # Usage
//!
//! ```text
//! hived run --config /etc/hive/hive.toml
//! hived sign --key <hex secret> --spec app.json --type register
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hive_core::config::NodeConfig;
use hive_core::types::{MessageType, epoch_millis};

const DEFAULT_LOG_FILTER: &str = "info,hived=debug,hive=debug";

#[derive(Parser)]
#[command(name = "hived", about = "Hive application hosting node")]
struct Cli {
    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node.
    Run {
        /// Node configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Override the data directory from the config.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print a signed specification message.
    Sign {
        /// Hex-encoded Ed25519 secret key of the owner.
        #[arg(long)]
        key: String,

        /// JSON application specification.
        #[arg(long)]
        spec: PathBuf,

        #[arg(long = "type", value_enum, default_value = "register")]
        kind: KindArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Register,
    Update,
}

impl From<KindArg> for MessageType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Register => MessageType::Register,
            KindArg::Update => MessageType::Update,
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, data_dir } => {
            let mut config = NodeConfig::from_file(&config)?;
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            hived::run(config).await
        }
        Command::Sign { key, spec, kind } => {
            let spec_json = std::fs::read_to_string(&spec)?;
            let message =
                hived::submit::signed_message(&key, &spec_json, kind.into(), epoch_millis())?;
            println!("{}", serde_json::to_string_pretty(&message)?);
            Ok(())
        }
    }
}
