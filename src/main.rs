//! mosque-times - keep per-city mosque prayer times in step with the backend.
//!
//! Selecting a city serves today's data from the local cache when possible.
//! When the backend has nothing real for the day yet, a scrape is requested
//! and its completion is awaited through a long-poll, after which the cache
//! is refreshed.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod api;
mod cache;
mod calendar;
mod commands;
mod config;
mod error;
mod sync;

use commands::{Context, OutputFormat};

#[derive(Parser)]
#[command(name = "mosque-times")]
#[command(author, version, about = "Mosque prayer times with background refresh")]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (default: ~/.mosque-times/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overrides config and environment
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Anonymous mode: don't save the selected city server-side
    #[arg(long, global = true)]
    public: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show prayer times for a city
    Select {
        /// City name (case-insensitive)
        city: String,

        /// Wait for a background update to finish and show its result
        #[arg(short, long)]
        wait: bool,

        /// Output format (human, json)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Show prayer times for the last selected city
    Restore {
        /// Wait for a background update to finish and show its result
        #[arg(short, long)]
        wait: bool,

        /// Output format (human, json)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Drop all cached cities and reload the last selected one
    Refresh {
        /// Output format (human, json)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Check whether the backend has prayer times for a date
    Exists {
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Request a backend scrape if a date has no data
    Scrape {
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Wait for the scrape to finish
        #[arg(short, long)]
        wait: bool,
    },

    /// Clear all cached city data
    CleanCache,

    /// Drop expired cache entries
    Purge,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "mosque_times=debug"
    } else {
        "mosque_times=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config =
        config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if cli.public {
        config.public = true;
    }
    config.validate()?;

    let ctx = Context::new(&config).context("Failed to set up client")?;

    match cli.command {
        Commands::Select { city, wait, format } => {
            commands::select::execute(&ctx.manager, &city, wait, OutputFormat::parse(&format)).await
        }
        Commands::Restore { wait, format } => {
            commands::select::execute_restore(&ctx.manager, wait, OutputFormat::parse(&format))
                .await
        }
        Commands::Refresh { format } => {
            commands::select::execute_refresh(&ctx.manager, OutputFormat::parse(&format)).await
        }
        Commands::Exists { date } => commands::scrape::execute_exists(&ctx, date.as_deref()).await,
        Commands::Scrape { date, wait } => {
            commands::scrape::execute(&ctx, &config, date.as_deref(), wait).await
        }
        Commands::CleanCache => commands::util::execute_clean_cache(&ctx.manager),
        Commands::Purge => commands::util::execute_purge(&ctx.manager),
    }
}
