//! OffSync CLI
//!
//! Command-line tools for inspecting a device's sync job queue.
//!
//! # Commands
//!
//! - `inspect` - Display queue statistics
//! - `list` - List live jobs
//! - `show` - Display one job in detail
//! - `cancel` - Cancel one job
//! - `cancel-all` - Cancel every job of an entity type
//!
//! The app that owns the queue must be stopped: the queue directory is
//! locked by whichever process opens it first.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// OffSync command-line queue tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display queue statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List live jobs
    List {
        /// Only jobs of this entity type
        #[arg(short, long)]
        entity_type: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display one job in detail
    Show {
        /// Unique job key, e.g. sync_sale_42
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Cancel one job
    Cancel {
        /// Unique job key
        key: String,
    },

    /// Cancel every job of an entity type
    CancelAll {
        /// Entity type, e.g. Sale
        entity_type: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Queue path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::List {
            entity_type,
            format,
        } => {
            let path = cli.path.ok_or("Queue path required for list")?;
            commands::list::run(&path, entity_type.as_deref(), &format)?;
        }
        Commands::Show { key, format } => {
            let path = cli.path.ok_or("Queue path required for show")?;
            commands::show::run(&path, &key, &format)?;
        }
        Commands::Cancel { key } => {
            let path = cli.path.ok_or("Queue path required for cancel")?;
            commands::cancel::run(&path, &key)?;
        }
        Commands::CancelAll { entity_type } => {
            let path = cli.path.ok_or("Queue path required for cancel-all")?;
            commands::cancel::run_all(&path, &entity_type)?;
        }
        Commands::Version => {
            println!("OffSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
