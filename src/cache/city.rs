//! Per-city cache of mosque/prayer-time bundles.
//!
//! Bundles are keyed by normalised city name and expire at the local
//! midnight ending the date they were fetched for: a timetable for today
//! says nothing about tomorrow, however young the entry is.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tracing::{debug, warn};

use super::store::TtlStore;
use crate::api::CityBundle;
use crate::calendar::{date_key, end_of_day, Clock};

/// Namespace shared by every key this cache manages.
pub const NAMESPACE: &str = "mosque_times_";
const CITY_PREFIX: &str = "mosque_times_city_";
const CITIES_INDEX: &str = "mosque_times_cities";
const LAST_SELECTED: &str = "lastSelectedCity";

/// Trim and lowercase a city name for keying.
pub fn normalize_city(name: &str) -> String {
    name.trim().to_lowercase()
}

fn city_key(normalized: &str) -> String {
    format!("{}{}", CITY_PREFIX, normalized)
}

/// City bundle cache over a [`TtlStore`].
pub struct CityDataCache {
    store: TtlStore,
    clock: Arc<dyn Clock>,
}

impl CityDataCache {
    pub fn new(store: TtlStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn get_city_data(&self, city: &str) -> Option<CityBundle> {
        let normalized = normalize_city(city);
        if normalized.is_empty() {
            return None;
        }

        let key = city_key(&normalized);
        let bundle: CityBundle = self.store.get(&key)?;
        let today = date_key(&self.clock.now());
        if bundle.date != today {
            debug!("Dropping {} bundle for {}, today is {}", normalized, bundle.date, today);
            self.store.remove(&key);
            return None;
        }
        Some(bundle)
    }

    /// Store `bundle` until the end of its own date and record the city in
    /// the index. A bundle whose date is already over is not stored.
    /// Returns whether the bundle was persisted.
    pub fn save_city_data(&self, city: &str, bundle: &CityBundle) -> bool {
        let normalized = normalize_city(city);
        if normalized.is_empty() {
            return false;
        }

        let Some(expires_at) = NaiveDate::parse_from_str(&bundle.date, "%Y-%m-%d")
            .ok()
            .and_then(|date| end_of_day(&Local, date))
            .map(|end| end.with_timezone(&Utc))
        else {
            warn!("Not caching {}: bad bundle date {:?}", normalized, bundle.date);
            return false;
        };
        if expires_at <= self.clock.now().with_timezone(&Utc) {
            debug!("Not caching {}: bundle for {} is already stale", normalized, bundle.date);
            return false;
        }

        if !self.store.set(&city_key(&normalized), bundle, Some(expires_at)) {
            return false;
        }

        let mut cities = self.known_cities();
        if !cities.contains(&normalized) {
            cities.push(normalized.clone());
            self.store.set(CITIES_INDEX, &cities, None);
        }

        debug!("Cached {} until {}", normalized, expires_at);
        true
    }

    /// Normalised names of every city saved since the last clear.
    pub fn known_cities(&self) -> Vec<String> {
        self.store.get(CITIES_INDEX).unwrap_or_default()
    }

    /// Remove every tracked city bundle and the index. Returns how many
    /// cities were tracked.
    pub fn clear_city_data(&self) -> usize {
        let cities = self.known_cities();
        for city in &cities {
            self.store.remove(&city_key(city));
        }
        self.store.remove(CITIES_INDEX);
        cities.len()
    }

    /// Remove every tracked city, the index and the last-selected pointer.
    pub fn clear_all(&self) -> usize {
        let cleared = self.clear_city_data();
        self.store.remove(LAST_SELECTED);
        cleared
    }

    /// Drop expired bundles and prune them from the index.
    pub fn purge_expired(&self) -> usize {
        let purged = self.store.purge_expired();

        let cities = self.known_cities();
        let live: Vec<String> = cities
            .iter()
            .filter(|c| self.store.get::<CityBundle>(&city_key(c)).is_some())
            .cloned()
            .collect();
        if live.len() != cities.len() {
            if live.is_empty() {
                self.store.remove(CITIES_INDEX);
            } else {
                self.store.set(CITIES_INDEX, &live, None);
            }
        }

        purged
    }

    pub fn last_selected_city(&self) -> Option<String> {
        self.store
            .get::<String>(LAST_SELECTED)
            .filter(|c| !c.trim().is_empty())
    }

    pub fn set_last_selected_city(&self, city: &str) {
        self.store.set(LAST_SELECTED, &city.trim(), None);
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &TtlStore {
        &self.store
    }
}
