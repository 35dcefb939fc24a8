use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::cache::CacheReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Processed,
    GeocodeSuccess,
    GeocodeFailure,
    GeocodeSkipped,
    CacheHit,
    Lookup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Counters {
    processed: usize,
    geocode_success: usize,
    geocode_failure: usize,
    geocode_skipped: usize,
    cache_hits: usize,
    lookups: usize,
}

impl Counters {
    fn slot(&mut self, counter: Counter) -> &mut usize {
        match counter {
            Counter::Processed => &mut self.processed,
            Counter::GeocodeSuccess => &mut self.geocode_success,
            Counter::GeocodeFailure => &mut self.geocode_failure,
            Counter::GeocodeSkipped => &mut self.geocode_skipped,
            Counter::CacheHit => &mut self.cache_hits,
            Counter::Lookup => &mut self.lookups,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub total: usize,
    pub processed: usize,
    pub geocode_success: usize,
    pub geocode_failure: usize,
    pub geocode_skipped: usize,
    pub cache_hits: usize,
    pub lookups: usize,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Successful geocodes as a percentage of all records.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.geocode_success as f64 / self.total as f64 * 100.0
    }

    pub fn log_summary(&self, cache: Option<CacheReport>, output: Option<&Path>) {
        info!(
            total = self.total,
            processed = self.processed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "conversion summary"
        );
        match cache {
            Some(report) => info!(
                success = self.geocode_success,
                failure = self.geocode_failure,
                skipped = self.geocode_skipped,
                success_rate = %format!("{:.1}%", self.success_rate()),
                cache_hits = self.cache_hits,
                lookups = self.lookups,
                cache_entries = report.total,
                cache_valid = report.valid,
                "geocoding summary"
            ),
            None => info!(skipped = self.geocode_skipped, "geocoding skipped"),
        }
        if let Some(path) = output {
            info!(path = %path.display(), "output written");
        }
    }
}

fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Counter set updated by every worker of a run.
#[derive(Debug)]
pub struct StatsAggregator {
    total: usize,
    started_at: DateTime<Utc>,
    clock: Instant,
    counters: Mutex<Counters>,
}

impl StatsAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started_at: Utc::now(),
            clock: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Bumps `counter` and returns its new value.
    pub fn increment(&self, counter: Counter) -> usize {
        let mut counters = self.counters.lock();
        let slot = counters.slot(counter);
        *slot += 1;
        *slot
    }

    pub fn snapshot(&self) -> RunStatistics {
        let counters = self.counters.lock().clone();
        RunStatistics {
            total: self.total,
            processed: counters.processed,
            geocode_success: counters.geocode_success,
            geocode_failure: counters.geocode_failure,
            geocode_skipped: counters.geocode_skipped,
            cache_hits: counters.cache_hits,
            lookups: counters.lookups,
            started_at: self.started_at,
            elapsed: self.clock.elapsed(),
        }
    }
}
