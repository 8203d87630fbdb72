//! Error types shared by the cache, API client and sync layers.

use thiserror::Error;

/// Errors raised below the sync manager boundary.
///
/// The sync manager never lets these escape: it logs them and degrades to
/// whatever is cached (see `sync::manager`).
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (connect, reset, client-side timeout).
    #[error("Network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// Backend answered with a non-success status.
    #[error("Backend returned {status} for {endpoint}")]
    Status { status: u16, endpoint: String },

    /// Payload did not have the expected shape.
    #[error("Malformed payload from {endpoint}: {message}")]
    DataShape { endpoint: String, message: String },

    /// The operation was cancelled by a newer one. Not a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// The long-poll ceiling elapsed before the scrape job finished.
    #[error("Timed out waiting for scrape of {date}")]
    ScrapeTimeout { date: String },

    /// The backing store refused a write because it is full.
    #[error("Storage full writing {key}")]
    StorageFull { key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn network(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Network {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn data_shape(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::DataShape {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    /// Whether a single retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::network("/x", "reset").is_transient());
        assert!(Error::Status {
            status: 503,
            endpoint: "/x".into()
        }
        .is_transient());
        assert!(!Error::Status {
            status: 404,
            endpoint: "/x".into()
        }
        .is_transient());
        assert!(!Error::data_shape("/x", "bad").is_transient());
        assert!(!Error::Cancelled.is_transient());
    }
}
