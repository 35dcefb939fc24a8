mod cache;
mod config;
mod errors;
mod geocoding;
mod ingestion;
mod lookup;
mod models;
mod normalize;
mod pipeline;
mod pool;
mod stats;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::{CacheEntry, CacheReport, GeocodeCache};
pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use geocoding::{GeocodeOutcome, GeocodingService};
pub use ingestion::{parse_rows, read_rows, validate_input, write_records, Row};
pub use lookup::{AddressLookup, NominatimClient, RateLimitedClient, RateLimiter};
pub use models::{columns, Coordinate, EnrichedRecord, Schedule};
pub use normalize::{normalize_address, qualify_address};
pub use pipeline::{ConversionOutput, Converter};
pub use pool::{Job, WorkerPool};
pub use stats::{Counter, RunStatistics, StatsAggregator};

pub fn init_tracing(verbose: bool) {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let default_directive = if verbose {
            "info,aid_location_converter=debug"
        } else {
            "info,aid_location_converter=info"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
