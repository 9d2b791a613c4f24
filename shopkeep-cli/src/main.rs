use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{BackupCommand, ConfigCommand, RemoteCommand, SlotCommand, SyncCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "shopkeep")]
#[command(version)]
#[command(about = "Inspect and sync Shopkeep point-of-sale data", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit stored slots
    Slot(SlotCommand),

    /// Export or restore all slots
    Backup(BackupCommand),

    /// Manage remote table credentials
    Remote(RemoteCommand),

    /// Sync slots with the remote table
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "shopkeep_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;
    tracing::debug!("Using data directory {}", config.data_dir.value.display());

    match &cli.command {
        Commands::Slot(cmd) => cmd.run(&config),
        Commands::Backup(cmd) => cmd.run(&config),
        Commands::Remote(cmd) => cmd.run(&config),
        Commands::Sync(cmd) => cmd.run(&config).map_err(|e| e.into()),
        Commands::Config(cmd) => cmd.run(&config),
    }
}
