//! AP Elite CLI
//!
//! Command-line front end for the hybrid sync engine.
//!
//! # Commands
//!
//! - `serve` - Run the operator API together with the sync and backup timers
//! - `serve-remote` - Run the reference remote document store
//! - `sync` - Run one sync cycle and print the report
//! - `backup` - Create or list backups
//! - `status` - Print the system status report
//! - `config` - Show or change the persisted settings

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// AP Elite hybrid online/offline sync.
#[derive(Parser)]
#[command(name = "apelite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data root holding the database, backups, config and logs
    #[arg(global = true, short, long, env = "APELITE_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Base URL of the remote document store
    #[arg(
        global = true,
        short,
        long,
        env = "APELITE_REMOTE_URL",
        default_value = "http://127.0.0.1:8787"
    )]
    remote_url: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator API and the sync/backup timers
    Serve {
        /// Address of the operator API
        #[arg(short, long, env = "APELITE_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Do not start the sync and backup timers
        #[arg(long)]
        no_scheduler: bool,

        /// Do not answer cross-origin requests
        #[arg(long)]
        no_cors: bool,
    },

    /// Run the reference remote document store
    ServeRemote {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },

    /// Run one sync cycle and print the report
    Sync,

    /// Create or list backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Print the system status report
    Status,

    /// Show or change the persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Take a snapshot of the local database
    Create,

    /// List existing snapshots, newest first
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,

    /// Set one setting; VALUE is parsed as JSON, falling back to a string
    Set {
        /// Setting name, e.g. sync_interval_minutes
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let workspace = commands::Workspace::new(cli.data_root, cli.remote_url);

    match cli.command {
        Commands::Serve {
            bind,
            no_scheduler,
            no_cors,
        } => commands::serve::run(&workspace, bind, !no_scheduler, !no_cors).await?,
        Commands::ServeRemote { bind } => commands::serve::run_remote(bind).await?,
        Commands::Sync => commands::sync::run(&workspace).await?,
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::backup::create(&workspace).await?,
            BackupAction::List { format } => commands::backup::list(&workspace, &format)?,
        },
        Commands::Status => commands::status::run(&workspace).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&workspace)?,
            ConfigAction::Set { key, value } => commands::config::set(&workspace, &key, &value)?,
        },
    }

    Ok(())
}
