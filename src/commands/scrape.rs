//! Scrape commands - check for and request backend data for a date.

use std::sync::{Arc, Mutex, Weak};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use colored::Colorize;

use super::Context;
use crate::api::MosqueTimesApi;
use crate::calendar::{date_key, Clock, SystemClock};
use crate::config::Config;
use crate::sync::waiter::{CompletionHandler, CompletionWaiter, WaitOutcome};
use crate::sync::{EnsureOutcome, ScrapeCoordinator, WaiterOptions};

/// Resolve `--date`, defaulting to today in local time.
fn resolve_date(date: Option<&str>) -> Result<String> {
    match date {
        None => Ok(date_key(&SystemClock.now())),
        Some(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(parsed) => Ok(parsed.format("%Y-%m-%d").to_string()),
            Err(_) => bail!("Invalid date '{}', expected YYYY-MM-DD", raw),
        },
    }
}

/// Execute the exists command.
pub async fn execute_exists(ctx: &Context, date: Option<&str>) -> Result<()> {
    let date = resolve_date(date)?;
    if ctx.client.data_exists(&date).await? {
        println!("{} Prayer times available for {}", "✓".green().bold(), date);
    } else {
        println!("{} No prayer times for {} yet", "✗".red().bold(), date);
    }
    Ok(())
}

/// Remembers the outcome so the command can print it after settling.
#[derive(Default)]
struct OutcomeSlot(Mutex<Option<WaitOutcome>>);

#[async_trait]
impl CompletionHandler for OutcomeSlot {
    async fn on_wait_outcome(&self, outcome: WaitOutcome) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome);
    }
}

/// Execute the scrape command: trigger a scrape for `date` if the backend
/// has no data, optionally waiting for it to finish.
pub async fn execute(ctx: &Context, config: &Config, date: Option<&str>, wait: bool) -> Result<()> {
    let date = resolve_date(date)?;
    let api: Arc<dyn MosqueTimesApi> = ctx.client.clone();

    let coordinator = ScrapeCoordinator::new(api.clone(), ctx.notifier.clone());
    let outcome = coordinator.ensure_data_for(&date).await;
    match outcome {
        EnsureOutcome::Present => {
            println!("{} Prayer times for {} already available", "✓".green().bold(), date);
            return Ok(());
        }
        EnsureOutcome::TriggerFailed => bail!("Failed to start scrape for {}", date),
        EnsureOutcome::Triggered | EnsureOutcome::AlreadyRunning => {
            println!("Scrape for {} started", date.cyan());
        }
    }

    if !wait {
        return Ok(());
    }

    let options = WaiterOptions {
        retry_delay: config.timeout_retry_delay(),
        max_timeout_retries: config.max_timeout_retries,
    };
    let waiter = Arc::new(CompletionWaiter::new(api, options));
    let slot = Arc::new(OutcomeSlot::default());
    let handler: Weak<dyn CompletionHandler> = {
        let strong: Arc<dyn CompletionHandler> = slot.clone();
        Arc::downgrade(&strong)
    };

    println!("{}", "Waiting for the scrape to finish…".dimmed());
    waiter.start(&date, handler);
    waiter.settled().await;

    let outcome = slot.0.lock().unwrap_or_else(|p| p.into_inner()).take();
    match outcome {
        Some(WaitOutcome::Completed { data_exists: true, .. }) => {
            println!("{} Prayer times for {} are ready", "✓".green().bold(), date);
        }
        Some(WaitOutcome::Completed { data_exists: false, .. }) => {
            println!("{} Scrape finished but found no times for {}", "!".yellow().bold(), date);
        }
        Some(WaitOutcome::TimedOut { .. }) => {
            println!(
                "{} Scrape still running; check again later with `mosque-times exists`",
                "!".yellow().bold()
            );
        }
        Some(WaitOutcome::Failed { reason, .. }) => bail!("Scrape for {} failed: {}", date, reason),
        None => bail!("Scrape wait for {} ended without an outcome", date),
    }

    Ok(())
}
