use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Coordinate;

/// External address resolver. `Ok(None)` means the provider had no match.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, full_address: &str) -> AppResult<Option<Coordinate>>;
}

/// Grants one permit per interval to every caller that shares it.
pub struct RateLimiter {
    interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

/// Lookup client throttled by a single limiter, however many workers call it.
#[derive(Clone)]
pub struct RateLimitedClient {
    inner: Arc<dyn AddressLookup>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn AddressLookup>, interval: Duration) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::new(interval)),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let nominatim = NominatimClient::new(config)?;
        Ok(Self::new(Arc::new(nominatim), config.rate_limit_interval))
    }

    pub async fn resolve(&self, full_address: &str) -> AppResult<Option<Coordinate>> {
        self.limiter.wait().await;
        trace!(address = full_address, "issuing external lookup");
        self.inner.lookup(full_address).await
    }
}

pub struct NominatimClient {
    http: Client,
    search_url: String,
    api_key: Option<SecretString>,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        let base = config.geocoder_endpoint.trim_end_matches('/');
        if base.is_empty() {
            return Err(AppError::Config("geocoder endpoint must not be empty".into()));
        }
        Ok(Self {
            http,
            search_url: format!("{base}/search"),
            api_key: config.geocoder_api_key.clone(),
        })
    }
}

#[async_trait]
impl AddressLookup for NominatimClient {
    async fn lookup(&self, full_address: &str) -> AppResult<Option<Coordinate>> {
        #[derive(Deserialize)]
        struct SearchHit {
            lat: String,
            lon: String,
        }

        let mut request = self.http.get(&self.search_url).query(&[
            ("q", full_address),
            ("format", "json"),
            ("limit", "1"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.expose_secret())]);
        }

        let hits: Vec<SearchHit> = request.send().await?.error_for_status()?.json().await?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let lat = parse_degrees(&hit.lat)?;
        let lng = parse_degrees(&hit.lon)?;
        Coordinate::new(lat, lng).map(Some).ok_or_else(|| {
            AppError::Parse(format!("non-finite coordinate for {full_address}"))
        })
    }
}

fn parse_degrees(value: &str) -> AppResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|err| AppError::Parse(format!("invalid coordinate {value:?}: {err}")))
}
