use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use aid_location_converter::{init_tracing, AppConfig, Converter};

/// Converts an aid location CSV into a geocoded JSON dataset.
#[derive(Debug, Parser)]
#[command(name = "aid-location-converter", version, about)]
struct Cli {
    /// Input CSV file
    #[arg(long)]
    input: Option<PathBuf>,
    /// Output JSON file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Geocode cache file
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Number of concurrent geocoding workers
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,
    /// Minimum milliseconds between geocoding requests
    #[arg(long = "rate-ms")]
    rate_ms: Option<u64>,
    /// Skip geocoding entirely
    #[arg(long)]
    skip_geocode: bool,
    /// Ignore the cache file on startup
    #[arg(long)]
    force: bool,
    /// Neither read nor write the cache file
    #[arg(long)]
    no_cache: bool,
    /// Country appended to addresses that lack it
    #[arg(long)]
    country: Option<String>,
    /// Base URL of the Nominatim-compatible geocoder
    #[arg(long)]
    endpoint: Option<String>,
    /// Log every record
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(input) = self.input {
            config.input_path = input;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(cache) = self.cache {
            config.cache_path = cache;
        }
        if let Some(workers) = self.workers {
            config.worker_count = usize::try_from(workers).unwrap_or(usize::MAX);
        }
        if let Some(rate_ms) = self.rate_ms {
            config.rate_limit_interval = Duration::from_millis(rate_ms);
        }
        if let Some(country) = self.country {
            config.default_country = country;
        }
        if let Some(endpoint) = self.endpoint {
            config.geocoder_endpoint = endpoint;
        }
        config.skip_geocoding |= self.skip_geocode;
        config.force_refresh |= self.force;
        config.use_cache &= !self.no_cache;
        config.verbose |= self.verbose;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(AppConfig::from_env());
    init_tracing(config.verbose);
    if config.verbose {
        config.log_profile();
    }

    let converter = Converter::from_config(config).context("failed to build geocoding client")?;
    let output = converter.convert_file().await.with_context(|| {
        format!(
            "conversion of {} failed",
            converter.config().input_path.display()
        )
    })?;

    output
        .stats
        .log_summary(output.cache, Some(&converter.config().output_path));
    info!("conversion completed");
    Ok(())
}
