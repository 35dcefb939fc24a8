use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info};

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_100;
pub const DEFAULT_COUNTRY: &str = "Chile";
pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub cache_path: PathBuf,
    pub worker_count: usize,
    pub rate_limit_interval: Duration,
    pub skip_geocoding: bool,
    pub use_cache: bool,
    pub force_refresh: bool,
    pub default_country: String,
    pub verbose: bool,
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub request_timeout: Duration,
    pub geocoder_api_key: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub input_path: String,
    pub output_path: String,
    pub cache_path: String,
    pub worker_count: usize,
    pub rate_limit_ms: u64,
    pub skip_geocoding: bool,
    pub use_cache: bool,
    pub force_refresh: bool,
    pub default_country: String,
    pub verbose: bool,
    pub geocoder_endpoint: String,
    pub has_geocoder_api_key: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data1.csv"),
            output_path: PathBuf::from("data1.json"),
            cache_path: PathBuf::from("geocache.json"),
            worker_count: DEFAULT_WORKERS,
            rate_limit_interval: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            skip_geocoding: false,
            use_cache: true,
            force_refresh: false,
            default_country: DEFAULT_COUNTRY.to_string(),
            verbose: false,
            geocoder_endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            geocoder_user_agent: default_user_agent(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            geocoder_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            input_path: parse_path("CONVERTER_INPUT", defaults.input_path),
            output_path: parse_path("CONVERTER_OUTPUT", defaults.output_path),
            cache_path: parse_path("CONVERTER_CACHE", defaults.cache_path),
            worker_count: parse_usize("CONVERTER_WORKERS", DEFAULT_WORKERS).max(1),
            rate_limit_interval: Duration::from_millis(parse_u64(
                "CONVERTER_RATE_LIMIT_MS",
                DEFAULT_RATE_LIMIT_MS,
            )),
            skip_geocoding: parse_bool("CONVERTER_SKIP_GEOCODE", false),
            use_cache: !parse_bool("CONVERTER_NO_CACHE", false),
            force_refresh: parse_bool("CONVERTER_FORCE_REFRESH", false),
            default_country: env::var("CONVERTER_COUNTRY")
                .unwrap_or_else(|_| DEFAULT_COUNTRY.to_string()),
            verbose: parse_bool("CONVERTER_VERBOSE", false),
            geocoder_endpoint: env::var("GEOCODER_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.geocoder_endpoint),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.geocoder_user_agent),
            request_timeout: Duration::from_millis(parse_u64(
                "GEOCODER_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),
            geocoder_api_key: env::var("GEOCODER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
        }
    }

    /// Worker count actually used by the pool. Without geocoding there is no
    /// shared resource to wait on, so a single worker does all the work.
    pub fn effective_worker_count(&self) -> usize {
        if self.skip_geocoding {
            1
        } else {
            self.worker_count.max(1)
        }
    }

    pub fn should_load_cache(&self) -> bool {
        self.use_cache && !self.skip_geocoding && !self.force_refresh
    }

    pub fn should_persist_cache(&self) -> bool {
        self.use_cache && !self.skip_geocoding
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            input_path: self.input_path.display().to_string(),
            output_path: self.output_path.display().to_string(),
            cache_path: self.cache_path.display().to_string(),
            worker_count: self.effective_worker_count(),
            rate_limit_ms: self.rate_limit_interval.as_millis() as u64,
            skip_geocoding: self.skip_geocoding,
            use_cache: self.use_cache,
            force_refresh: self.force_refresh,
            default_country: self.default_country.clone(),
            verbose: self.verbose,
            geocoder_endpoint: self.geocoder_endpoint.clone(),
            has_geocoder_api_key: self.geocoder_api_key.is_some(),
        }
    }

    pub fn log_profile(&self) {
        let profile = self.public_profile();
        info!(
            input = %profile.input_path,
            output = %profile.output_path,
            cache = %profile.cache_path,
            workers = profile.worker_count,
            rate_limit_ms = profile.rate_limit_ms,
            country = %profile.default_country,
            use_cache = profile.use_cache,
            force_refresh = profile.force_refresh,
            skip_geocoding = profile.skip_geocoding,
            endpoint = %profile.geocoder_endpoint,
            has_api_key = profile.has_geocoder_api_key,
            "converter configuration"
        );
    }
}

fn default_user_agent() -> String {
    format!("aid-location-converter/{}", env!("CARGO_PKG_VERSION"))
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_overrides_from_env_and_hides_secrets() {
        env::set_var("CONVERTER_WORKERS", "0");
        env::set_var("CONVERTER_RATE_LIMIT_MS", "250");
        env::set_var("CONVERTER_COUNTRY", "Argentina");
        env::set_var("GEOCODER_API_KEY", "secret");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(config.worker_count, 1);
        assert_eq!(config.rate_limit_interval, Duration::from_millis(250));
        assert_eq!(public.default_country, "Argentina");
        assert!(public.has_geocoder_api_key);
        assert!(!serde_json::to_string(&public).unwrap().contains("secret"));

        env::remove_var("CONVERTER_WORKERS");
        env::remove_var("CONVERTER_RATE_LIMIT_MS");
        env::remove_var("CONVERTER_COUNTRY");
        env::remove_var("GEOCODER_API_KEY");
    }

    #[test]
    fn skipping_geocoding_forces_single_worker_and_no_cache() {
        let config = AppConfig {
            worker_count: 8,
            skip_geocoding: true,
            ..AppConfig::default()
        };
        assert_eq!(config.effective_worker_count(), 1);
        assert!(!config.should_load_cache());
        assert!(!config.should_persist_cache());
    }

    #[test]
    fn force_refresh_skips_load_but_still_persists() {
        let config = AppConfig {
            force_refresh: true,
            ..AppConfig::default()
        };
        assert!(!config.should_load_cache());
        assert!(config.should_persist_cache());

        let disabled = AppConfig {
            use_cache: false,
            ..AppConfig::default()
        };
        assert!(!disabled.should_load_cache());
        assert!(!disabled.should_persist_cache());
    }
}
