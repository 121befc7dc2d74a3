// PDN Monitor - Core Library
// Aggregation and scoring engine over execution reports, shared by the CLI
// and the API server.

pub mod db;
pub mod error;
pub mod config;
pub mod snapshot;
pub mod availability;
pub mod trend;
pub mod alerts;
pub mod ranking;
pub mod dashboard;

// Re-export commonly used types
pub use db::{
    ExecutionRecord, SystemDefinition, RecordStore, SqliteStore, MemoryStore, StoreResult,
    open_read_only, setup_database, insert_system, insert_record,
};
pub use error::{AggregationError, StoreError};
pub use config::MonitorConfig;
pub use snapshot::{Snapshot, PairKey, PairHistory, SystemCatalog};
pub use availability::{classify, Tier, TierCounts};
pub use trend::{classify_trend, parse_total, Trend, TrendCounts};
pub use alerts::{generate_alerts, system_display_name, Alert, AlertLevel};
pub use ranking::{rank_entities, EntityRanking, DEFAULT_RANKING_LIMIT};
pub use dashboard::{
    build_dashboard, summary, api_distribution, availability_distribution, trend_distribution,
    system_listing, ChartSlice, DashboardPayload, Summary, SystemListing,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber used by both binaries (RUST_LOG, default "info")
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
