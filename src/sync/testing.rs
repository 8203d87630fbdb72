//! In-process backend double for sync tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::oneshot;

use crate::api::{CompletionReport, MosqueTimesApi, TimeRecord, Venue, VenueId};
use crate::calendar::testing::ManualClock;
use crate::error::{Error, Result};

/// How one long-poll call behaves.
pub enum WaitScript {
    Reply(CompletionReport),
    /// Held open until the sender fires; dropped sender never resolves.
    Gated(oneshot::Receiver<CompletionReport>),
}

#[derive(Default)]
pub struct FakeApi {
    pub mosques: Mutex<Vec<Venue>>,
    pub times: Mutex<Vec<(VenueId, TimeRecord)>>,
    /// Scripted existence answers; `Err(())` is a transient failure.
    /// Empty queue answers `false`.
    pub exists: Mutex<VecDeque<std::result::Result<bool, ()>>>,
    pub fail_fetch: Mutex<bool>,
    pub fail_trigger: Mutex<bool>,
    /// Empty queue holds the wait open forever.
    pub waits: Mutex<VecDeque<WaitScript>>,
    pub calls: Mutex<Vec<String>>,
    /// Moves the clock while the next prayer-times request is in flight.
    pub clock_jump: Mutex<Option<(Arc<ManualClock>, DateTime<Local>)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data(&self, mosques: Vec<Venue>, times: Vec<(VenueId, TimeRecord)>) {
        *self.mosques.lock().unwrap() = mosques;
        *self.times.lock().unwrap() = times;
    }

    pub fn push_wait(&self, script: WaitScript) {
        self.waits.lock().unwrap().push_back(script);
    }

    /// A wait that resolves when the returned sender fires.
    pub fn gate_wait(&self) -> oneshot::Sender<CompletionReport> {
        let (tx, rx) = oneshot::channel();
        self.push_wait(WaitScript::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn venue(id: u32, name: &str) -> Venue {
    Venue {
        id: VenueId::new(&id.to_string()),
        name: name.to_string(),
        address: format!("{} Street", name),
        coordinates: None,
        times: None,
    }
}

pub fn times(id: u32, fajr: &str) -> (VenueId, TimeRecord) {
    (
        VenueId::new(&id.to_string()),
        TimeRecord::new()
            .with("fajr", Some(fajr))
            .with("dhuhr", Some(fajr))
            .with("asr", Some(fajr))
            .with("maghrib", Some(fajr))
            .with("isha", Some(fajr)),
    )
}

#[async_trait]
impl MosqueTimesApi for FakeApi {
    async fn data_exists(&self, date: &str) -> Result<bool> {
        self.record(format!("exists {}", date));
        match self.exists.lock().unwrap().pop_front() {
            Some(Ok(exists)) => Ok(exists),
            Some(Err(())) => Err(Error::network("/mosque-times/exists", "connection reset")),
            None => Ok(false),
        }
    }

    async fn city_mosques(&self, city: &str) -> Result<Vec<Venue>> {
        self.record(format!("mosques {}", city));
        if *self.fail_fetch.lock().unwrap() {
            return Err(Error::network("/mosque-times/cities", "connection refused"));
        }
        Ok(self.mosques.lock().unwrap().clone())
    }

    async fn prayer_times(&self, city: &str, date: &str) -> Result<Vec<(VenueId, TimeRecord)>> {
        self.record(format!("times {} {}", city, date));
        if let Some((clock, to)) = self.clock_jump.lock().unwrap().take() {
            clock.set(to);
        }
        if *self.fail_fetch.lock().unwrap() {
            return Err(Error::network("/mosque-times/cities", "connection refused"));
        }
        Ok(self.times.lock().unwrap().clone())
    }

    async fn trigger_scrape(&self) -> Result<()> {
        self.record("trigger".to_string());
        if *self.fail_trigger.lock().unwrap() {
            return Err(Error::Status {
                status: 500,
                endpoint: "/mosque-times/scrape-all".into(),
            });
        }
        Ok(())
    }

    async fn wait_for_scrape(&self, date: &str) -> Result<CompletionReport> {
        self.record(format!("wait {}", date));
        let script = self.waits.lock().unwrap().pop_front();
        match script {
            Some(WaitScript::Reply(report)) => Ok(report),
            Some(WaitScript::Gated(rx)) => match rx.await {
                Ok(report) => Ok(report),
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    async fn save_selected_city(&self, city: &str) -> Result<()> {
        self.record(format!("save {}", city));
        Ok(())
    }
}
