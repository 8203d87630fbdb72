//! Durable key/value backends for the TTL store.

#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Raw string storage. Only `TtlStore` talks to a backing directly.
pub trait Backing: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// One JSON file per key in a directory.
///
/// Default location: `~/.mosque-times/storage/`.
pub struct FileBacking {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileBacking {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            quota_bytes: None,
        }
    }

    /// Refuse writes that would grow the directory past `bytes`.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mosque-times")
            .join("storage")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> Result<u64> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == skip {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

impl Backing for FileBacking {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(&path)?;
            if used + value.len() as u64 > quota {
                return Err(Error::StorageFull {
                    key: key.to_string(),
                });
            }
        }

        fs::write(&path, value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(key) = urlencoding::decode(stem) {
                keys.push(key.into_owned());
            }
        }
        Ok(keys)
    }
}

/// In-process map, optionally capped at a number of entries.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBacking {
    entries: Mutex<HashMap<String, String>>,
    capacity: Option<usize>,
}

#[cfg(test)]
impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
impl Backing for MemoryBacking {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock();
        if let Some(cap) = self.capacity {
            if !entries.contains_key(key) && entries.len() >= cap {
                return Err(Error::StorageFull {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backing_roundtrip_with_odd_keys() {
        let temp_dir = TempDir::new().unwrap();
        let backing = FileBacking::new(temp_dir.path().to_path_buf());

        backing.write("mosque_times_city_são paulo/x", "{}").unwrap();
        assert_eq!(
            backing.read("mosque_times_city_são paulo/x").unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(backing.keys().unwrap(), vec!["mosque_times_city_são paulo/x"]);

        backing.delete("mosque_times_city_são paulo/x").unwrap();
        backing.delete("mosque_times_city_são paulo/x").unwrap();
        assert!(backing.read("mosque_times_city_são paulo/x").unwrap().is_none());
    }

    #[test]
    fn test_file_backing_quota() {
        let temp_dir = TempDir::new().unwrap();
        let backing = FileBacking::new(temp_dir.path().to_path_buf()).with_quota(10);

        backing.write("a", "12345").unwrap();
        // Rewriting the same key does not count its old size.
        backing.write("a", "1234567").unwrap();
        assert!(matches!(
            backing.write("b", "12345"),
            Err(Error::StorageFull { .. })
        ));
    }

    #[test]
    fn test_memory_backing_capacity() {
        let backing = MemoryBacking::with_capacity(1);
        backing.write("a", "1").unwrap();
        backing.write("a", "2").unwrap();
        assert!(backing.write("b", "1").is_err());
        assert_eq!(backing.read("a").unwrap().as_deref(), Some("2"));
    }
}
