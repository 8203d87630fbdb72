//! HTTP client for the mosque-times backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{
    CompletionReport, CompletionResponse, ExistsResponse, MosqueRow, PrayerTimesResponse,
};
use super::{MosqueTimesApi, TimeRecord, Venue, VenueId};
use crate::config::Config;
use crate::error::{Error, Result};

/// Client for the mosque-times API.
pub struct MosqueTimesClient {
    client: Client,
    base: String,
    token: Option<String>,
    long_poll_timeout: Duration,
}

/// `POST /mosque-times/user/selected-city` body.
#[derive(Debug, Serialize)]
struct SelectedCityRequest<'a> {
    city: &'a str,
}

impl MosqueTimesClient {
    /// Create a client from configuration.
    ///
    /// Ordinary calls use `request_timeout_secs`; the long-poll uses its own
    /// longer ceiling.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("mosque-times/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            long_poll_timeout: Duration::from_secs(config.long_poll_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response> {
        debug!("Calling {}", endpoint);

        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::network(endpoint, e))?;

        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path, self.client.get(self.url(path))).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(path, e))?;
        serde_json::from_str(&body).map_err(|e| Error::data_shape(path, e))
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl MosqueTimesApi for MosqueTimesClient {
    async fn data_exists(&self, date: &str) -> Result<bool> {
        let path = format!("/mosque-times/exists/{}", segment(date));
        let body: ExistsResponse = self.get_json(&path).await?;
        Ok(body.exists)
    }

    async fn city_mosques(&self, city: &str) -> Result<Vec<Venue>> {
        let path = format!("/mosque-times/cities/{}/mosques", segment(city));

        let rows: Vec<serde_json::Value> = match self.get_json(&path).await {
            Ok(rows) => rows,
            Err(e @ Error::DataShape { .. }) => {
                warn!("{}; treating as no mosques", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let total = rows.len();
        let venues: Vec<Venue> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<MosqueRow>(row) {
                Ok(row) => Some(Venue::from(row)),
                Err(e) => {
                    warn!("Skipping malformed mosque row from {}: {}", path, e);
                    None
                }
            })
            .collect();

        debug!("Got {}/{} mosques for {}", venues.len(), total, city);
        Ok(venues)
    }

    async fn prayer_times(&self, city: &str, date: &str) -> Result<Vec<(VenueId, TimeRecord)>> {
        let path = format!(
            "/mosque-times/cities/{}/date/{}/prayer-times",
            segment(city),
            segment(date)
        );

        let body: PrayerTimesResponse = match self.get_json(&path).await {
            Ok(body) => body,
            Err(e @ Error::DataShape { .. }) => {
                warn!("{}; treating as no prayer times", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let records: Vec<(VenueId, TimeRecord)> = body
            .prayer_times
            .iter()
            .filter_map(|row| {
                let parsed = row.as_object().and_then(TimeRecord::from_row);
                if parsed.is_none() {
                    warn!("Skipping prayer-times row without mosque_id from {}", path);
                }
                parsed
            })
            .collect();

        debug!("Got {} prayer-time rows for {} on {}", records.len(), city, date);
        Ok(records)
    }

    async fn trigger_scrape(&self) -> Result<()> {
        let path = "/mosque-times/scrape-all";
        self.send(path, self.client.post(self.url(path))).await?;
        Ok(())
    }

    async fn wait_for_scrape(&self, date: &str) -> Result<CompletionReport> {
        let path = format!("/mosque-times/wait-scraping-completion/{}", segment(date));
        debug!("Long-polling {}", path);

        // A client-side timeout is a timed-out wait, not a transport failure.
        let request = self
            .authorize(self.client.get(self.url(&path)))
            .header("Accept", "application/json")
            .timeout(self.long_poll_timeout);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(CompletionReport::Timeout),
            Err(e) => return Err(Error::network(&path, e)),
        };

        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                endpoint: path,
            });
        }

        match response.json::<CompletionResponse>().await {
            Ok(body) => Ok(CompletionReport::from(body)),
            Err(e) if e.is_timeout() => Ok(CompletionReport::Timeout),
            Err(e) => Err(Error::data_shape(&path, e)),
        }
    }

    async fn save_selected_city(&self, city: &str) -> Result<()> {
        let path = "/mosque-times/user/selected-city";
        let request = self
            .client
            .post(self.url(path))
            .json(&SelectedCityRequest { city });
        self.send(path, request).await?;
        Ok(())
    }
}
