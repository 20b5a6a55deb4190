//! shipyard — deploys fleets of remote middleware containers.
//!
//! Reads a TOML deployment file, creates the declared containers in
//! dependency order over SSH, forms the ensemble, and tears everything
//! down again.
//!
//! # Usage
//!
//! ```text
//! shipyard plan -f deploy.toml --json
//! shipyard up -f deploy.toml
//! shipyard run -f deploy.toml --command "fabric:container-list" --on root
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "info,shipyard=debug";

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Shipyard — middleware container fleet deployer",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the creation order of a deployment without touching any host
    Plan {
        /// Deployment file
        #[arg(short, long)]
        file: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create every container and leave the fleet running
    Up {
        /// Deployment file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Create the fleet, optionally run one command, then tear it down
    Run {
        /// Deployment file
        #[arg(short, long)]
        file: PathBuf,
        /// Command for a container's middleware shell
        #[arg(long)]
        command: Option<String>,
        /// Container to run the command on (default: the first root)
        #[arg(long, requires = "command")]
        on: Option<String>,
        /// Leave the fleet running afterwards
        #[arg(long)]
        keep: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Plan { file, json } => commands::plan::plan(&file, json),
        Commands::Up { file } => commands::up::up(&file).await,
        Commands::Run {
            file,
            command,
            on,
            keep,
        } => commands::run::run(&file, command.as_deref(), on.as_deref(), keep).await,
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}
