//! LED Dimmer
//!
//! Interactive controller for serial LED dimmers: manual brightness,
//! per-channel and combined countdown timers, and live device telemetry.

mod config;
mod console;
mod controller;
mod error;
mod events;
mod input;
mod state;
mod timer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "leddimmer")]
#[command(about = "Control serial LED dimmers with countdown timers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to connect to at start-up
    #[arg(long)]
    port: Option<String>,

    /// Firmware protocol: single or dual
    #[arg(long)]
    channels: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,
    /// Start the interactive console (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout belongs to the console
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            info!("Loaded configuration from: {}", path.display());
            config
        }
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = Some(port);
    }
    if let Some(channels) = cli.channels {
        config.device.channels = channels;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Ports => {
            let ports = led_dimmer_hw::list_available_ports().context("Failed to list serial ports")?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    let mode = config.channel_mode()?;
    let (handle, task) = controller::spawn(mode, config.serial_settings(), config.events.capacity);
    info!("Controller started in {} mode", mode);

    if let Some(port) = &config.serial.port {
        match handle.connect(port).await {
            Ok(()) => println!("Connected to {}", port),
            Err(e) => warn!("Could not connect to {}: {}. Use `connect <port>` to retry.", port, e),
        }
    }

    console::run(handle.clone()).await?;

    if let Err(e) = handle.shutdown().await {
        warn!("Controller shutdown: {}", e);
    }
    task.await.context("Controller task failed")?;
    Ok(())
}
