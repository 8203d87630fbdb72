//! Waiting for a backend scrape job to finish.
//!
//! One long-poll request per wait, held open by the server until the job
//! for the date completes. At most one wait is outstanding per waiter: a new
//! [`CompletionWaiter::start`] cancels the one in flight rather than queueing
//! behind it, and a cancelled wait never reaches its handler, even if its
//! response was already on the wire.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::{CompletionReport, MosqueTimesApi};
use crate::error::Error;

/// Lifecycle of the current wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Idle,
    Waiting,
    /// Outcome claimed, handler running.
    Delivering,
    Resolved,
    Cancelled,
    TimedOut,
    Failed,
}

impl WaitPhase {
    pub fn is_settled(self) -> bool {
        !matches!(self, WaitPhase::Waiting | WaitPhase::Delivering)
    }
}

/// What a finished wait hands to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed { date: String, data_exists: bool },
    TimedOut { date: String },
    Failed { date: String, reason: String },
}

impl WaitOutcome {
    fn phase(&self) -> WaitPhase {
        match self {
            WaitOutcome::Completed { .. } => WaitPhase::Resolved,
            WaitOutcome::TimedOut { .. } => WaitPhase::TimedOut,
            WaitOutcome::Failed { .. } => WaitPhase::Failed,
        }
    }
}

/// Receives the outcome of a wait that was not superseded.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_wait_outcome(&self, outcome: WaitOutcome);
}

#[derive(Debug, Clone, Copy)]
pub struct WaiterOptions {
    /// Pause before re-issuing a wait that timed out.
    pub retry_delay: Duration,
    /// Re-issues allowed after a timeout.
    pub max_timeout_retries: u32,
}

impl Default for WaiterOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(60),
            max_timeout_retries: 1,
        }
    }
}

#[derive(Default)]
struct Slot {
    /// Bumped on every start and cancel; a task only delivers if its
    /// generation is still current.
    generation: u64,
    /// Date of the outstanding wait.
    date: Option<String>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

pub struct CompletionWaiter {
    api: Arc<dyn MosqueTimesApi>,
    options: WaiterOptions,
    slot: Mutex<Slot>,
    phase: watch::Sender<WaitPhase>,
}

impl CompletionWaiter {
    pub fn new(api: Arc<dyn MosqueTimesApi>, options: WaiterOptions) -> Self {
        let (phase, _) = watch::channel(WaitPhase::Idle);
        Self {
            api,
            options,
            slot: Mutex::new(Slot::default()),
            phase,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn phase(&self) -> WaitPhase {
        *self.phase.borrow()
    }

    /// Begin waiting for the scrape of `date`, cancelling any wait still in
    /// flight. Returns the date of the superseded wait, if there was one.
    /// Must be called within a Tokio runtime.
    pub fn start(
        self: &Arc<Self>,
        date: &str,
        handler: Weak<dyn CompletionHandler>,
    ) -> Option<String> {
        let mut slot = self.slot();
        let superseded = if self.phase() == WaitPhase::Waiting {
            debug!("Superseding outstanding scrape wait");
            self.cancel_locked(&mut slot)
        } else {
            None
        };

        slot.generation += 1;
        let generation = slot.generation;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        slot.cancel = Some(cancel_tx);
        slot.date = Some(date.to_string());
        self.phase.send_replace(WaitPhase::Waiting);

        let waiter = Arc::clone(self);
        let date = date.to_string();
        slot.task = Some(tokio::spawn(async move {
            waiter.run(generation, date, cancel_rx, handler).await;
        }));
        superseded
    }

    /// Abort the outstanding wait, if any, returning its date. Silent:
    /// nothing is delivered.
    pub fn cancel(&self) -> Option<String> {
        let mut slot = self.slot();
        if self.phase() == WaitPhase::Waiting {
            self.cancel_locked(&mut slot)
        } else {
            None
        }
    }

    fn cancel_locked(&self, slot: &mut Slot) -> Option<String> {
        slot.generation += 1;
        if let Some(cancel) = slot.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        self.phase.send_replace(WaitPhase::Cancelled);
        slot.date.take()
    }

    /// Resolve once no wait is outstanding or being delivered.
    pub async fn settled(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| phase.is_settled()).await;
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        date: String,
        mut cancel: oneshot::Receiver<()>,
        handler: Weak<dyn CompletionHandler>,
    ) {
        let mut retries_left = self.options.max_timeout_retries;

        let outcome = loop {
            // Dropping the request future on cancel aborts the HTTP request.
            let report = tokio::select! {
                _ = &mut cancel => {
                    debug!("Scrape wait for {}: {}", date, Error::Cancelled);
                    return;
                }
                report = self.api.wait_for_scrape(&date) => report,
            };

            match report {
                Ok(CompletionReport::Completed { data_exists }) => {
                    break WaitOutcome::Completed { date, data_exists };
                }
                Ok(CompletionReport::Timeout) if retries_left > 0 => {
                    retries_left -= 1;
                    info!(
                        "Scrape wait for {} timed out; checking again in {:?}",
                        date, self.options.retry_delay
                    );
                    tokio::select! {
                        _ = &mut cancel => return,
                        _ = sleep(self.options.retry_delay) => {}
                    }
                }
                Ok(CompletionReport::Timeout) => break WaitOutcome::TimedOut { date },
                Ok(CompletionReport::Failed(reason)) => break WaitOutcome::Failed { date, reason },
                Err(e) => {
                    warn!("Scrape wait for {} failed: {}", date, e);
                    break WaitOutcome::Failed {
                        date,
                        reason: e.to_string(),
                    };
                }
            }
        };

        {
            let mut slot = self.slot();
            if slot.generation != generation {
                debug!("Discarding superseded scrape outcome {:?}", outcome);
                return;
            }
            slot.cancel = None;
            slot.date = None;
            self.phase.send_replace(WaitPhase::Delivering);
        }

        if let Some(handler) = handler.upgrade() {
            handler.on_wait_outcome(outcome.clone()).await;
        }

        let mut slot = self.slot();
        if slot.generation == generation {
            slot.task = None;
            self.phase.send_replace(outcome.phase());
        }
    }
}
