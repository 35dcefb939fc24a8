use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheReport, GeocodeCache};
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::lookup::RateLimitedClient;
use crate::models::Coordinate;
use crate::normalize::{normalize_address, qualify_address};

/// Result of a single `geocode` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    /// Blank address; nothing was attempted.
    Empty,
    Cached(Coordinate),
    Resolved(Coordinate),
    NotFound,
    Failed,
}

impl GeocodeOutcome {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Self::Cached(coordinate) | Self::Resolved(coordinate) => Some(*coordinate),
            Self::Empty | Self::NotFound | Self::Failed => None,
        }
    }

    /// Whether this outcome issued an external request.
    pub fn used_lookup(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::NotFound | Self::Failed)
    }
}

/// Cache-first geocoder shared by every worker of a run.
pub struct GeocodingService {
    cache: Arc<GeocodeCache>,
    client: RateLimitedClient,
    default_country: String,
}

impl GeocodingService {
    pub fn new(
        cache: Arc<GeocodeCache>,
        client: RateLimitedClient,
        default_country: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            client,
            default_country: default_country.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = RateLimitedClient::from_config(config)?;
        Ok(Self::new(
            Arc::new(GeocodeCache::new()),
            client,
            config.default_country.clone(),
        ))
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    pub fn load_cache(&self, path: &Path) -> usize {
        self.cache.load(path)
    }

    pub fn save_cache(&self, path: &Path) -> AppResult<()> {
        self.cache.save(path)
    }

    pub fn cache_report(&self) -> CacheReport {
        self.cache.report()
    }

    pub fn cache_key(&self, address: &str) -> String {
        normalize_address(address, &self.default_country)
    }

    /// Resolves `address` through the cache, falling back to the rate-limited
    /// client. There is no single-flight guard: workers that miss on the same
    /// key at the same time each issue a lookup, and the last store wins.
    pub async fn geocode(&self, address: &str) -> GeocodeOutcome {
        let address = address.trim();
        if address.is_empty() {
            return GeocodeOutcome::Empty;
        }

        let key = self.cache_key(address);
        if let Some(coordinate) = self.cache.lookup(&key).and_then(|e| e.coordinate()) {
            debug!(address, "cache hit");
            return GeocodeOutcome::Cached(coordinate.rounded());
        }

        let full_address = qualify_address(address, &self.default_country);
        debug!(address = %full_address, "geocoding");
        match self.client.resolve(&full_address).await {
            Ok(Some(coordinate)) => {
                let coordinate = coordinate.rounded();
                self.cache.store(key.clone(), CacheEntry::new(key, coordinate));
                GeocodeOutcome::Resolved(coordinate)
            }
            Ok(None) => {
                warn!(address, "no coordinates found");
                GeocodeOutcome::NotFound
            }
            Err(err) => {
                warn!(address, error = %err, "geocoding failed");
                GeocodeOutcome::Failed
            }
        }
    }
}
