//! Mosque-times backend API.

mod client;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::MosqueTimesClient;
pub use types::{CityBundle, CompletionReport, Prayer, TimeRecord, Venue, VenueId};

/// The backend surface the sync layer depends on.
///
/// Malformed payloads are logged and read as empty lists by implementations;
/// only transport and status failures come back as errors.
#[async_trait]
pub trait MosqueTimesApi: Send + Sync {
    /// `GET /mosque-times/exists/{date}`
    async fn data_exists(&self, date: &str) -> Result<bool>;

    /// `GET /mosque-times/cities/{city}/mosques`
    async fn city_mosques(&self, city: &str) -> Result<Vec<Venue>>;

    /// `GET /mosque-times/cities/{city}/date/{date}/prayer-times`
    async fn prayer_times(&self, city: &str, date: &str) -> Result<Vec<(VenueId, TimeRecord)>>;

    /// `POST /mosque-times/scrape-all`. Resolves once the job is accepted.
    async fn trigger_scrape(&self) -> Result<()>;

    /// `GET /mosque-times/wait-scraping-completion/{date}`, held open by the
    /// server until the job finishes or its ceiling elapses.
    async fn wait_for_scrape(&self, date: &str) -> Result<CompletionReport>;

    /// `POST /mosque-times/user/selected-city`
    async fn save_selected_city(&self, city: &str) -> Result<()>;
}
