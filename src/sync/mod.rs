//! Keeping per-city prayer data in step with the backend scraper.

pub mod associate;
pub mod events;
mod manager;
pub mod scrape;
pub mod waiter;

#[cfg(test)]
mod testing;

pub use events::{Notifier, Severity, Signal};
pub use manager::{SelectStatus, Selection, SyncManager, SyncOptions};
pub use scrape::{EnsureOutcome, ScrapeCoordinator};
pub use waiter::{WaitPhase, WaiterOptions};
