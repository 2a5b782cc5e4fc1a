//! # ECDSA Toolbox Server
//!
//! Runs the toolbox service on the configured host and port.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ecdsa_toolbox::{config, Config, ToolboxServer};
use tracing::{debug, info};

/// ECDSA crypto toolbox challenge server
#[derive(Parser)]
#[command(name = "ecdsa-toolbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Flag served by the debug menu, overrides the configuration file
    #[arg(long)]
    flag: Option<String>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                debug!("Loading config from {:?}", path);
                config::load(path).context("Failed to load configuration")?
            }
            None => Config::default(),
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(flag) = &self.flag {
            config.challenge.flag = flag.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", config::generate_sample());
        return Ok(());
    }

    init_logging(cli.verbose);

    let config = cli.load_config()?;
    let server = ToolboxServer::bind(&config)
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;
    info!("Serving ECDSA toolbox on {}", server.local_addr());

    server.run().await?;
    Ok(())
}
