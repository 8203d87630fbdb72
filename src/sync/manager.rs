//! Top-level orchestration of city selection and post-scrape refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::associate::{associate, is_bundle_usable};
use super::events::{Notifier, Signal};
use super::scrape::{ScrapeCoordinator, ScrapeJobStatus};
use super::waiter::{CompletionHandler, CompletionWaiter, WaitOutcome, WaitPhase, WaiterOptions};
use crate::api::{CityBundle, MosqueTimesApi};
use crate::cache::CityDataCache;
use crate::calendar::{date_key, Clock};
use crate::config::Config;
use crate::error::{Error, Result};

/// Who the manager is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Signed-in user; the selection is also saved server-side.
    Authenticated,
    /// Anonymous visitor; the selection stays local.
    Public,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub variant: Variant,
    /// Pause between clearing the cache and re-fetching after a scrape.
    pub refresh_grace: Duration,
    pub waiter: WaiterOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            variant: Variant::Authenticated,
            refresh_grace: Duration::from_secs(3),
            waiter: WaiterOptions::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            variant: if config.public {
                Variant::Public
            } else {
                Variant::Authenticated
            },
            refresh_grace: config.refresh_grace(),
            waiter: WaiterOptions {
                retry_delay: config.timeout_retry_delay(),
                max_timeout_retries: config.max_timeout_retries,
            },
        }
    }
}

/// How a selection was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectStatus {
    /// From today's cache.
    Cached,
    /// Fetched, usable and cached.
    Fresh,
    /// Fetched but not usable; a scrape is being awaited and will refresh.
    Pending,
    /// Fetched but not usable, and no refresh is coming.
    Incomplete,
    /// Nothing could be loaded.
    Unavailable,
}

/// The result of selecting a city. Never an error: failures degrade to
/// `Unavailable` with no bundle.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub city: String,
    pub status: SelectStatus,
    pub bundle: Option<CityBundle>,
}

impl Selection {
    fn unavailable(city: &str) -> Self {
        Self {
            city: city.to_string(),
            status: SelectStatus::Unavailable,
            bundle: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    /// Re-run after a scrape; never starts another scrape cycle.
    Refresh,
}

struct SelectedCity {
    name: String,
    generation: u64,
}

/// Keeps per-city prayer data fresh for one client context.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

struct Inner {
    me: Weak<Inner>,
    api: Arc<dyn MosqueTimesApi>,
    cache: CityDataCache,
    coordinator: ScrapeCoordinator,
    waiter: Arc<CompletionWaiter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    selected: Mutex<Option<SelectedCity>>,
    generation: AtomicU64,
}

impl SyncManager {
    pub fn new(
        api: Arc<dyn MosqueTimesApi>,
        cache: CityDataCache,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            coordinator: ScrapeCoordinator::new(api.clone(), notifier.clone()),
            waiter: Arc::new(CompletionWaiter::new(api.clone(), options.waiter)),
            api,
            cache,
            notifier,
            clock,
            options,
            selected: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        Self { inner }
    }

    /// Show `city`: from cache if fresh today, otherwise fetched. Missing or
    /// placeholder-only data starts a scrape cycle whose completion refreshes
    /// the data in the background.
    pub async fn select_city(&self, city: &str) -> Selection {
        self.inner.select(city, Origin::User).await
    }

    /// Re-select the city persisted by a previous session, if any.
    pub async fn restore_last_selection(&self) -> Option<Selection> {
        let city = self.inner.cache.last_selected_city()?;
        info!("Restoring last selected city {}", city);
        Some(self.select_city(&city).await)
    }

    /// Drop all cached cities, wait out the grace period and re-select the
    /// current city (or the one persisted by a previous session). `None` if
    /// no city was ever selected.
    pub async fn refresh_after_scrape(&self) -> Option<Selection> {
        self.inner.refresh().await
    }

    #[cfg(test)]
    pub fn selected_city(&self) -> Option<String> {
        self.inner.selected_city()
    }

    /// Today's cached bundle for `city`, without touching the network.
    pub fn cached_city(&self, city: &str) -> Option<CityBundle> {
        self.inner.cache.get_city_data(city)
    }

    #[cfg(test)]
    pub fn scrape_status(&self, date: &str) -> ScrapeJobStatus {
        self.inner.coordinator.status(date)
    }

    pub fn wait_phase(&self) -> WaitPhase {
        self.inner.waiter.phase()
    }

    /// Abort the outstanding scrape wait, if any. The next selection checks
    /// the backend afresh instead of assuming that scrape is still running.
    pub fn cancel_wait(&self) {
        if let Some(date) = self.inner.waiter.cancel() {
            self.inner.coordinator.release(&date);
        }
    }

    /// Resolve once no scrape wait (or its refresh) is in progress.
    pub async fn settle(&self) {
        self.inner.waiter.settled().await;
    }

    /// Remove every cached city and the persisted selection.
    pub fn clear_cache(&self) -> usize {
        self.inner.cache.clear_all()
    }

    /// Drop expired city bundles.
    pub fn purge_expired(&self) -> usize {
        self.inner.cache.purge_expired()
    }
}

impl Inner {
    fn selected_city(&self) -> Option<String> {
        self.selected
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|s| s.name.clone())
    }

    /// Record `city` as selected; later calls win.
    fn mark_selected(&self, city: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.selected.lock().unwrap_or_else(|p| p.into_inner()) = Some(SelectedCity {
            name: city.to_string(),
            generation,
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.selected
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    async fn persist_selection(&self, city: &str) {
        self.cache.set_last_selected_city(city);

        if self.options.variant == Variant::Authenticated {
            if let Err(e) = self.api.save_selected_city(city).await {
                warn!("Could not save selected city server-side: {}", e);
            }
        }
    }

    async fn fetch_bundle(&self, city: &str, date: &str) -> Result<CityBundle> {
        let (venues, records) = tokio::join!(
            self.api.city_mosques(city),
            self.api.prayer_times(city, date)
        );

        let venues = associate(venues?, records?);
        debug!("Associated {} venues for {} on {}", venues.len(), city, date);

        Ok(CityBundle {
            city: city.to_string(),
            date: date.to_string(),
            venues,
        })
    }

    async fn select(&self, city: &str, origin: Origin) -> Selection {
        let city = city.trim();
        if city.is_empty() {
            warn!("Ignoring selection of an empty city name");
            return Selection::unavailable(city);
        }

        let generation = self.mark_selected(city);

        if let Some(bundle) = self.cache.get_city_data(city) {
            debug!("Serving {} from cache", city);
            if self.is_current(generation) {
                self.cache.set_last_selected_city(city);
            }
            self.notifier.notify(Signal::CitySelected);
            return Selection {
                city: city.to_string(),
                status: SelectStatus::Cached,
                bundle: Some(bundle),
            };
        }

        let date = date_key(&self.clock.now());
        let bundle = match self.fetch_bundle(city, &date).await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("Failed to load data for {}: {}", city, e);
                self.notifier.notify(Signal::LoadError);
                return Selection::unavailable(city);
            }
        };

        if !is_bundle_usable(&bundle) {
            let status = match origin {
                Origin::User => {
                    info!("No usable times for {} on {}; starting scrape cycle", city, date);
                    if self.begin_scrape_cycle(&date).await {
                        SelectStatus::Pending
                    } else {
                        SelectStatus::Incomplete
                    }
                }
                Origin::Refresh => {
                    warn!("Still no usable times for {} after scrape", city);
                    SelectStatus::Incomplete
                }
            };
            return Selection {
                city: city.to_string(),
                status,
                bundle: Some(bundle),
            };
        }

        if !self.cache.save_city_data(city, &bundle) {
            debug!("{} for {} served without caching", city, bundle.date);
        }
        if self.is_current(generation) {
            self.persist_selection(city).await;
        } else {
            debug!("Selection of {} superseded; not persisting", city);
        }
        self.notifier.notify(Signal::CitySelected);

        Selection {
            city: city.to_string(),
            status: SelectStatus::Fresh,
            bundle: Some(bundle),
        }
    }

    /// Ensure a scrape is running for `date` and wait for it in the
    /// background. Returns whether a refresh is on its way.
    async fn begin_scrape_cycle(&self, date: &str) -> bool {
        let outcome = self.coordinator.ensure_data_for(date).await;
        if !outcome.worth_waiting() {
            return false;
        }

        let handler: Weak<dyn CompletionHandler> = self.me.clone();
        if let Some(superseded) = self.waiter.start(date, handler) {
            if superseded != date {
                self.coordinator.release(&superseded);
            }
        }
        true
    }

    async fn refresh(&self) -> Option<Selection> {
        // One scrape run refreshes every city, so drop them all.
        let cleared = self.cache.clear_city_data();
        info!("Cleared {} cached cities after scrape", cleared);

        sleep(self.options.refresh_grace).await;

        let Some(city) = self
            .selected_city()
            .or_else(|| self.cache.last_selected_city())
        else {
            debug!("No city selected; nothing to refresh");
            return None;
        };

        let selection = self.select(&city, Origin::Refresh).await;
        if selection.status == SelectStatus::Fresh {
            self.notifier.notify(Signal::DataRefreshed);
        }
        Some(selection)
    }
}

#[async_trait]
impl CompletionHandler for Inner {
    async fn on_wait_outcome(&self, outcome: WaitOutcome) {
        match outcome {
            WaitOutcome::Completed {
                date,
                data_exists: true,
            } => {
                info!("Scrape for {} completed with data; refreshing", date);
                self.coordinator.record(&date, ScrapeJobStatus::Completed);
                self.notifier.notify(Signal::ScrapingCompleted);
                self.refresh().await;
            }
            WaitOutcome::Completed {
                date,
                data_exists: false,
            } => {
                self.coordinator.record(&date, ScrapeJobStatus::Completed);
                info!("Scrape for {} completed without new data", date);
            }
            WaitOutcome::TimedOut { date } => {
                self.coordinator.record(&date, ScrapeJobStatus::Timeout);
                warn!("{}", Error::ScrapeTimeout { date });
            }
            WaitOutcome::Failed { date, reason } => {
                self.coordinator.record(&date, ScrapeJobStatus::Failed);
                warn!("Scrape for {} failed: {}", date, reason);
                self.notifier.notify(Signal::ScrapingFailed);
            }
        }
    }
}
