//! Client configuration.
//!
//! Layers, lowest priority first: built-in defaults, the optional
//! `~/.mosque-times/config.toml`, then environment variables (a `.env` file
//! is loaded first if present).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API base, e.g. `https://example.org/api`. Paths are appended as-is.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token for the authenticated variant.
    #[serde(default)]
    pub token: Option<String>,

    /// Where cached city data is persisted.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Refuse cache writes past this many bytes on disk.
    #[serde(default)]
    pub storage_quota_bytes: Option<u64>,

    /// Timeout for ordinary requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Client-side ceiling for the scrape-completion long-poll.
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_secs: u64,

    /// Pause between clearing the cache and re-fetching after a scrape.
    #[serde(default = "default_refresh_grace")]
    pub refresh_grace_secs: u64,

    /// Delay before re-checking a scrape whose wait timed out.
    #[serde(default = "default_timeout_retry_delay")]
    pub timeout_retry_delay_secs: u64,

    /// How many times a timed-out wait is re-issued.
    #[serde(default = "default_max_timeout_retries")]
    pub max_timeout_retries: u32,

    /// Anonymous use: no token, selection is not saved server-side.
    #[serde(default)]
    pub public: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_api_base() -> String {
    "http://localhost:8000/api".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_long_poll_timeout() -> u64 {
    600
}
fn default_refresh_grace() -> u64 {
    3
}
fn default_timeout_retry_delay() -> u64 {
    60
}
fn default_max_timeout_retries() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            cache_dir: None,
            storage_quota_bytes: None,
            request_timeout_secs: default_request_timeout(),
            long_poll_timeout_secs: default_long_poll_timeout(),
            refresh_grace_secs: default_refresh_grace(),
            timeout_retry_delay_secs: default_timeout_retry_delay(),
            max_timeout_retries: default_max_timeout_retries(),
            public: false,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mosque-times")
            .join("config.toml")
    }

    pub fn refresh_grace(&self) -> Duration {
        Duration::from_secs(self.refresh_grace_secs)
    }

    pub fn timeout_retry_delay(&self) -> Duration {
        Duration::from_secs(self.timeout_retry_delay_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let mut issues: Vec<String> = Vec::new();

        let base = self.api_base.trim();
        if base.is_empty() {
            issues.push("api_base must not be empty".into());
        } else if !(base.starts_with("http://") || base.starts_with("https://")) {
            issues.push(format!("api_base must be an http(s) URL, got '{}'", base));
        }
        if self.request_timeout_secs == 0 {
            issues.push("request_timeout_secs must be > 0".into());
        }
        if self.long_poll_timeout_secs == 0 {
            issues.push("long_poll_timeout_secs must be > 0".into());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Invalid config:\n - {}",
                issues.join("\n - ")
            )))
        }
    }

    /// Apply `MOSQUE_TIMES_*` environment overrides.
    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = var("MOSQUE_TIMES_API_BASE") {
            self.api_base = base;
        }
        if let Some(token) = var("MOSQUE_TIMES_TOKEN") {
            self.token = Some(token);
        }
        if let Some(dir) = var("MOSQUE_TIMES_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(quota) = var("MOSQUE_TIMES_STORAGE_QUOTA") {
            let parsed = quota.trim().parse::<u64>().map_err(|_| {
                Error::Config("MOSQUE_TIMES_STORAGE_QUOTA must be a byte count".into())
            })?;
            self.storage_quota_bytes = Some(parsed);
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load configuration from `path` (or the default location) and the
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
    let mut config = if path.exists() {
        read_file(&path)?
    } else {
        Config::default()
    };

    config.apply_env(|name| dotenvy::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "api_base = \"https://prayers.example\"\npublic = true\n").unwrap();

        let config = read_file(&path).unwrap();
        assert_eq!(config.api_base, "https://prayers.example");
        assert!(config.public);
        assert_eq!(config.refresh_grace_secs, 3);
        assert_eq!(config.max_timeout_retries, 1);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MOSQUE_TIMES_API_BASE", "https://env.example"),
            ("MOSQUE_TIMES_STORAGE_QUOTA", "4096"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base, "https://env.example");
        assert_eq!(config.storage_quota_bytes, Some(4096));

        let bad: HashMap<&str, &str> = HashMap::from([("MOSQUE_TIMES_STORAGE_QUOTA", "lots")]);
        assert!(config
            .apply_env(|k| bad.get(k).map(|v| v.to_string()))
            .is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let config = Config {
            api_base: "ftp://nope".into(),
            request_timeout_secs: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("api_base"));
        assert!(err.contains("request_timeout_secs"));
    }
}
