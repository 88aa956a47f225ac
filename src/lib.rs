//! Resilient aggregation of course statistics.
//!
//! Several independent upstream endpoints are fetched concurrently; each one
//! settles into a [`FetchOutcome`], failed or malformed sources degrade to a
//! zero count, and the webinar count is derived by classifying the sections of
//! a course-detail payload. [`Aggregator::run`] never fails: callers inspect
//! [`AggregationResult::success_count`] to detect a degraded run.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod types;

pub use aggregator::Aggregator;
pub use classifier::{SectionVerdict, WebinarClassifier};
pub use config::{ConfigError, FetchPolicy, StatsConfig};
pub use fetcher::{Fetcher, HttpTransport, Transport};
pub use types::{AggregationResult, FetchError, FetchOutcome, Metric, Section, Source};

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::{
        AggregationResult, Aggregator, FetchOutcome, Metric, Section, Source, StatsConfig, WebinarClassifier,
    };
}

/// Loads configuration (see [`StatsConfig::load`]) and runs one aggregation
/// against the real upstream endpoints.
pub async fn aggregate(config_path: Option<&std::path::Path>) -> anyhow::Result<AggregationResult> {
    let cfg = StatsConfig::load(config_path)?;
    let aggregator = Aggregator::from_config(&cfg)?;
    Ok(aggregator.run().await)
}
