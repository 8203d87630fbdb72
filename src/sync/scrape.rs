//! Making sure the backend has data for a date.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use super::events::{Notifier, Signal};
use crate::api::MosqueTimesApi;
use crate::error::Result;

/// Client-side view of a backend scrape job.
///
/// `Timeout` is only ever a client classification; the job may still be
/// running server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeJobStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Timeout,
}

/// Result of [`ScrapeCoordinator::ensure_data_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Backend already has data for the date; nothing triggered.
    Present,
    /// A scrape was requested and accepted.
    Triggered,
    /// A scrape for the date is already in flight; not re-triggered.
    AlreadyRunning,
    /// The trigger request itself failed.
    TriggerFailed,
}

impl EnsureOutcome {
    /// Whether waiting for completion makes sense.
    pub fn worth_waiting(self) -> bool {
        !matches!(self, EnsureOutcome::TriggerFailed)
    }
}

pub struct ScrapeCoordinator {
    api: Arc<dyn MosqueTimesApi>,
    notifier: Arc<dyn Notifier>,
    jobs: Mutex<HashMap<String, ScrapeJobStatus>>,
}

impl ScrapeCoordinator {
    pub fn new(api: Arc<dyn MosqueTimesApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn status(&self, date: &str) -> ScrapeJobStatus {
        self.jobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(date)
            .copied()
            .unwrap_or(ScrapeJobStatus::NotStarted)
    }

    pub fn record(&self, date: &str, status: ScrapeJobStatus) {
        debug!("Scrape job for {} is now {:?}", date, status);
        self.jobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(date.to_string(), status);
    }

    /// Forget an in-progress job nobody is waiting on any more, so the next
    /// `ensure_data_for` checks the backend again. Settled jobs are kept.
    pub fn release(&self, date: &str) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        if jobs.get(date) == Some(&ScrapeJobStatus::InProgress) {
            debug!("Releasing in-progress scrape job for {}", date);
            jobs.remove(date);
        }
    }

    /// Existence check, retried once on a transient failure.
    async fn check_exists(&self, date: &str) -> Result<bool> {
        match self.api.data_exists(date).await {
            Err(e) if e.is_transient() => {
                debug!("Existence check for {} failed ({}), retrying once", date, e);
                self.api.data_exists(date).await
            }
            other => other,
        }
    }

    /// Trigger a scrape for `date` unless the backend already has data.
    ///
    /// An existence check that keeps failing counts as "missing": a spare
    /// scrape costs an idle cycle, a skipped one leaves stale data on screen.
    pub async fn ensure_data_for(&self, date: &str) -> EnsureOutcome {
        if self.status(date) == ScrapeJobStatus::InProgress {
            debug!("Scrape for {} already in progress", date);
            return EnsureOutcome::AlreadyRunning;
        }

        match self.check_exists(date).await {
            Ok(true) => {
                debug!("Backend already has data for {}", date);
                return EnsureOutcome::Present;
            }
            Ok(false) => info!("No data for {}, requesting scrape", date),
            Err(e) => warn!("Existence check for {} failed ({}); assuming missing", date, e),
        }

        self.notifier.notify(Signal::ScrapingStarted);
        self.record(date, ScrapeJobStatus::InProgress);

        match self.api.trigger_scrape().await {
            Ok(()) => EnsureOutcome::Triggered,
            Err(e) => {
                error!("Failed to trigger scrape for {}: {}", date, e);
                self.record(date, ScrapeJobStatus::Failed);
                self.notifier.notify(Signal::ScrapingFailed);
                EnsureOutcome::TriggerFailed
            }
        }
    }
}
