//! Marquee CLI - companion tool for the Marquee player
//!
//! Features:
//! - Source resolution for a media id
//! - Stream probing (source reachability, rendition ladder)
//! - Offline replay of recorded player sessions
//! - Configuration inspection

use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

mod commands;
mod output;
mod replay;

/// Marquee CLI - playback toolkit
#[derive(Parser)]
#[command(name = "marquee-cli")]
#[command(version)]
#[command(about = "Source resolution, stream probing and session replay for Marquee", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sources and storage keys of a media id
    Resolve {
        /// Media id
        id: String,

        /// API base the movie paths hang off
        #[arg(short, long, default_value = replay::DEFAULT_BASE)]
        base: String,

        /// Player configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check a media id's sources and list its renditions
    Inspect {
        /// Media id
        id: String,

        /// API base the movie paths hang off
        #[arg(short, long, default_value = replay::DEFAULT_BASE)]
        base: String,

        /// Player configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Replay a recorded session script against simulated host doubles
    Replay {
        /// Script file (JSON)
        script: PathBuf,

        /// Saved playback state to start from (JSON object of storage keys)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Player configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective player configuration
    Config {
        /// Configuration file to validate and print
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();
    marquee_core::init();

    let format = OutputFormat::from(cli.format.as_str());

    match cli.command {
        Commands::Resolve { id, base, config } => {
            commands::resolve(&id, &base, config, format)?;
        }
        Commands::Inspect { id, base, config } => {
            commands::inspect(&id, &base, config, format).await?;
        }
        Commands::Replay { script, state, config } => {
            commands::replay(&script, state, config, format)?;
        }
        Commands::Config { file } => {
            commands::config(file)?;
        }
    }

    Ok(())
}
