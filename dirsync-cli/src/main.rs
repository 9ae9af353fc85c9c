//! # dirsync
//!
//! One binary, two roles:
//!
//! ```bash
//! dirsync server ./staging              # start the hub
//! dirsync client ./synced-dir           # start an edge replica
//! ```
//!
//! The edge reads its pre-shared key from `./.settings` (`secretKey = ...`);
//! `serverAddr` in the same file or `--addr` on the command line points it at
//! the hub.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use dirsync_edge::{EdgeConfig, SecretKey};
use dirsync_hub::Hub;

mod settings;

use settings::Settings;

/// Default hub port.
const DEFAULT_PORT: u16 = 9000;

/// Directory synchronization over a central relay.
#[derive(Parser, Debug)]
#[command(name = "dirsync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the hub: accept edges and relay their changes
    Server {
        /// Directory for staging in-flight payloads
        directory: PathBuf,

        /// Listen address
        #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
        addr: String,
    },

    /// Start an edge replica: watch a directory and mirror it via the hub
    Client {
        /// Directory to watch and synchronize
        directory: PathBuf,

        /// Hub address (overrides `serverAddr` from the settings file)
        #[arg(long)]
        addr: Option<String>,

        /// Settings file with the pre-shared `secretKey`
        #[arg(long, default_value = ".settings")]
        settings: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { directory, addr } => run_server(directory, addr).await,
        Commands::Client {
            directory,
            addr,
            settings,
        } => run_client(directory, addr, settings).await,
    }
}

async fn run_server(directory: PathBuf, addr: String) -> Result<()> {
    let hub = Arc::new(Hub::new(&directory).context("failed to prepare staging directory")?);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    hub.run(listener).await?;
    Ok(())
}

async fn run_client(
    directory: PathBuf,
    addr: Option<String>,
    settings_path: PathBuf,
) -> Result<()> {
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;

    let key = SecretKey::from_str_key(settings.require("secretKey")?)
        .context("secretKey must be exactly 32 bytes")?;

    let addr = addr
        .or_else(|| settings.get("serverAddr").map(str::to_string))
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"));

    dirsync_edge::run(EdgeConfig::new(directory, addr, key)).await?;
    Ok(())
}
