use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::storage::RecordStore;

pub mod commands;

use self::commands::{DismissArgs, ListArgs, ReplayArgs};

#[derive(Parser, Debug)]
#[command(
    name = "delwatch",
    version,
    about = "Keeps a per-channel log of chat messages deleted by the other side"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over DELWATCH_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over DELWATCH_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the watcher with a recorded JSON-lines mutation feed
    Replay(ReplayArgs),
    /// Print the stored deletion records of a channel
    List(ListArgs),
    /// Remove stored records matching a rendered record id
    Dismiss(DismissArgs),
    /// List channels that have stored records
    Channels,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("DELWATCH_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("DELWATCH_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let store = RecordStore::open(&config.store)?;

    let output = match cli.command {
        Commands::Replay(args) => commands::replay(&config, store, &args)?,
        Commands::List(args) => commands::list(&store, &args)?,
        Commands::Dismiss(args) => commands::dismiss(&store, &args)?,
        Commands::Channels => commands::channels(&store)?,
    };
    print!("{output}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
