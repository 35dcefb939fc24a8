use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(alias = "Address")]
    pub address: String,
    #[serde(alias = "Lat")]
    pub lat: f64,
    #[serde(alias = "Lng")]
    pub lng: f64,
    #[serde(alias = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(address: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            address: address.into(),
            lat: coordinate.lat,
            lng: coordinate.lng,
            timestamp: Utc::now(),
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub total: usize,
    /// Entries whose coordinate is not the zero pair.
    pub valid: usize,
}

/// Address to coordinate memo shared by every worker of a run.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the in-memory entries with the contents of `path`. Any read
    /// or decode failure leaves the cache empty.
    pub fn load(&self, path: &Path) -> usize {
        match read_entries(path) {
            Ok(entries) => {
                let count = entries.len();
                *self.entries.write() = entries;
                info!(path = %path.display(), entries = count, "geocode cache loaded");
                count
            }
            Err(AppError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                self.entries.write().clear();
                debug!(path = %path.display(), "no geocode cache on disk; starting cold");
                0
            }
            Err(err) => {
                self.entries.write().clear();
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read geocode cache; starting cold"
                );
                0
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn store(&self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.write().insert(key.into(), entry);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Writes every entry to `path` through a sibling temp file and a rename,
    /// so readers never observe a half-written cache.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let serialized = {
            let entries = self.entries.read();
            let ordered: BTreeMap<&String, &CacheEntry> = entries.iter().collect();
            serde_json::to_vec_pretty(&ordered)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = staging_path(path);
        fs::write(&staging, serialized)?;
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(AppError::Io(err));
        }
        debug!(path = %path.display(), "geocode cache saved");
        Ok(())
    }

    pub fn report(&self) -> CacheReport {
        let entries = self.entries.read();
        let valid = entries
            .values()
            .filter(|entry| entry.coordinate().is_some_and(|c| !c.is_zero()))
            .count();
        CacheReport {
            total: entries.len(),
            valid,
        }
    }
}

fn read_entries(path: &Path) -> AppResult<HashMap<String, CacheEntry>> {
    let contents = fs::read(path)?;
    // A cache file holding `null` is treated like an empty one.
    let entries: Option<HashMap<String, CacheEntry>> = serde_json::from_slice(&contents)?;
    Ok(entries.unwrap_or_default())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "geocache.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
