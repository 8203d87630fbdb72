//! Notification signals emitted for the presentation layer.

/// How loudly a signal should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A scrape job was requested; data is being updated.
    ScrapingStarted,
    ScrapingCompleted,
    ScrapingFailed,
    /// Fresh data replaced the cache after a scrape.
    DataRefreshed,
    CitySelected,
    /// Data could not be loaded; the user should try again.
    LoadError,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::ScrapingStarted => "scraping-started",
            Signal::ScrapingCompleted => "scraping-completed",
            Signal::ScrapingFailed => "scraping-failed",
            Signal::DataRefreshed => "data-refreshed",
            Signal::CitySelected => "city-selected",
            Signal::LoadError => "load-error",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Signal::ScrapingStarted => Severity::Info,
            Signal::ScrapingCompleted | Signal::DataRefreshed | Signal::CitySelected => {
                Severity::Success
            }
            Signal::ScrapingFailed => Severity::Warning,
            Signal::LoadError => Severity::Error,
        }
    }
}

/// Receiver of UI-facing signals. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, signal: Signal);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingNotifier(Mutex<Vec<Signal>>);

    impl RecordingNotifier {
        pub fn signals(&self) -> Vec<Signal> {
            self.0.lock().unwrap().clone()
        }

        pub fn count(&self, signal: Signal) -> usize {
            self.signals().iter().filter(|s| **s == signal).count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, signal: Signal) {
            self.0.lock().unwrap().push(signal);
        }
    }
}
