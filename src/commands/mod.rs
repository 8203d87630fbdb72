//! CLI command implementations.

pub mod scrape;
pub mod select;
pub mod util;

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tracing::debug;

use crate::api::MosqueTimesClient;
use crate::cache::{CityDataCache, FileBacking, TtlStore, NAMESPACE};
use crate::calendar::SystemClock;
use crate::config::Config;
use crate::sync::{Notifier, Severity, Signal, SyncManager, SyncOptions};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Human,
        }
    }
}

/// Prints signals to stderr so they don't mix with JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, signal: Signal) {
        debug!(signal = signal.name(), "notify");
        let message = match signal {
            Signal::ScrapingStarted => "Updating prayer times in the background…",
            Signal::ScrapingCompleted => "Prayer times updated",
            Signal::ScrapingFailed => "Could not update prayer times",
            Signal::DataRefreshed => "Showing refreshed prayer times",
            Signal::CitySelected => return,
            Signal::LoadError => "Could not load prayer times, please try again",
        };
        let symbol = match signal.severity() {
            Severity::Info => "ℹ".blue().bold(),
            Severity::Success => "✓".green().bold(),
            Severity::Warning => "!".yellow().bold(),
            Severity::Error => "✗".red().bold(),
        };
        eprintln!("{} {}", symbol, message);
    }
}

/// Everything a command needs, wired from configuration.
pub struct Context {
    pub client: Arc<MosqueTimesClient>,
    pub manager: SyncManager,
    pub notifier: Arc<dyn Notifier>,
}

impl Context {
    pub fn new(config: &Config) -> Result<Self> {
        let mut config = config.clone();
        if config.public {
            config.token = None;
        }

        let dir = config.cache_dir.clone().unwrap_or_else(FileBacking::default_dir);
        let mut backing = FileBacking::new(dir);
        if let Some(quota) = config.storage_quota_bytes {
            backing = backing.with_quota(quota);
        }

        let clock = Arc::new(SystemClock);
        let store = TtlStore::new(Box::new(backing), NAMESPACE, clock.clone());
        let cache = CityDataCache::new(store, clock.clone());

        let client = Arc::new(MosqueTimesClient::new(&config)?);
        let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
        let manager = SyncManager::new(
            client.clone(),
            cache,
            notifier.clone(),
            clock,
            SyncOptions::from_config(&config),
        );

        Ok(Self {
            client,
            manager,
            notifier,
        })
    }
}
