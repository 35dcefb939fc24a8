use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::cache::CacheReport;
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geocoding::{GeocodeOutcome, GeocodingService};
use crate::ingestion::{read_rows, validate_input, write_records, Row};
use crate::models::{columns, EnrichedRecord};
use crate::pool::{Job, WorkerPool};
use crate::stats::{Counter, RunStatistics, StatsAggregator};

const PROGRESS_LABEL_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub records: Vec<EnrichedRecord>,
    pub stats: RunStatistics,
    /// Present when geocoding ran.
    pub cache: Option<CacheReport>,
}

/// Orchestrates one conversion run: cache load, worker pool, cache save.
pub struct Converter {
    config: AppConfig,
    geocoder: Arc<GeocodingService>,
}

impl Converter {
    pub fn new(config: AppConfig, geocoder: Arc<GeocodingService>) -> Self {
        Self { config, geocoder }
    }

    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let geocoder = GeocodingService::from_config(&config)?;
        Ok(Self::new(config, Arc::new(geocoder)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn geocoder(&self) -> &GeocodingService {
        &self.geocoder
    }

    /// Reads the configured CSV, enriches it and writes the JSON output.
    pub async fn convert_file(&self) -> AppResult<ConversionOutput> {
        validate_input(&self.config.input_path)?;
        let rows = read_rows(&self.config.input_path)?;
        info!(
            input = %self.config.input_path.display(),
            output = %self.config.output_path.display(),
            rows = rows.len(),
            "starting conversion"
        );

        let output = self.run(rows).await?;
        write_records(&self.config.output_path, &output.records)?;
        Ok(output)
    }

    pub async fn run(&self, rows: Vec<Row>) -> AppResult<ConversionOutput> {
        let stats = Arc::new(StatsAggregator::new(rows.len()));
        let jobs = Job::from_rows(rows);

        if self.config.should_load_cache() {
            self.geocoder.load_cache(&self.config.cache_path);
        } else {
            debug!("skipping geocode cache load");
        }

        let enricher = Arc::new(RecordEnricher {
            geocoder: Arc::clone(&self.geocoder),
            stats: Arc::clone(&stats),
            skip_geocoding: self.config.skip_geocoding,
            verbose: self.config.verbose,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let pool = WorkerPool::new(self.config.effective_worker_count());
        debug!(workers = pool.workers(), jobs = jobs.len(), "starting worker pool");
        let records = pool
            .run(jobs, move |job| {
                let enricher = Arc::clone(&enricher);
                async move { enricher.enrich(job).await }
            })
            .await?;

        if self.config.should_persist_cache() {
            if let Err(err) = self.geocoder.save_cache(&self.config.cache_path) {
                warn!(
                    path = %self.config.cache_path.display(),
                    error = %err,
                    "failed to save geocode cache"
                );
            }
        }

        let cache = (!self.config.skip_geocoding).then(|| self.geocoder.cache_report());
        Ok(ConversionOutput {
            records,
            stats: stats.snapshot(),
            cache,
        })
    }
}

struct RecordEnricher {
    geocoder: Arc<GeocodingService>,
    stats: Arc<StatsAggregator>,
    skip_geocoding: bool,
    verbose: bool,
    timestamp: String,
}

impl RecordEnricher {
    async fn enrich(&self, job: Job) -> EnrichedRecord {
        let current = self.stats.increment(Counter::Processed);
        if self.verbose {
            info!(
                "[{}/{}] processing: {}",
                current,
                self.stats.total(),
                progress_label(job.row.text(columns::NAME))
            );
        }

        let address = job.row.text(columns::ADDRESS);
        let outcome = if self.skip_geocoding {
            GeocodeOutcome::Empty
        } else {
            self.geocoder.geocode(address).await
        };
        self.record_outcome(&outcome);

        EnrichedRecord::from_row(job.index, &job.row, outcome.coordinate(), &self.timestamp)
    }

    fn record_outcome(&self, outcome: &GeocodeOutcome) {
        if outcome.used_lookup() {
            self.stats.increment(Counter::Lookup);
        }
        match outcome {
            GeocodeOutcome::Empty => {
                self.stats.increment(Counter::GeocodeSkipped);
            }
            GeocodeOutcome::Cached(_) => {
                self.stats.increment(Counter::CacheHit);
                self.stats.increment(Counter::GeocodeSuccess);
            }
            GeocodeOutcome::Resolved(_) => {
                self.stats.increment(Counter::GeocodeSuccess);
            }
            GeocodeOutcome::NotFound | GeocodeOutcome::Failed => {
                self.stats.increment(Counter::GeocodeFailure);
            }
        }
    }
}

fn progress_label(name: &str) -> String {
    if name.chars().count() <= PROGRESS_LABEL_CHARS {
        return name.to_string();
    }
    let truncated: String = name.chars().take(PROGRESS_LABEL_CHARS).collect();
    format!("{truncated}...")
}
