//! Symptom Insights - readiness scoring and cohort symptom benchmarks
//!
//! The engine turns daily symptom/mood/sleep logs into two derived datasets
//! and one read path:
//! normalization → readiness scoring → cohort aggregation → insights.
//!
//! ## Modules
//!
//! - **Readiness**: per-user, per-day composite score with streak
//! - **Benchmarks**: k-anonymous per-cohort symptom statistics
//! - **Insights**: a user's symptoms placed against their cohort, plus
//!   pass-through correlation rows with generated labels
//!
//! All components are synchronous and stateless apart from the store, and
//! every batch entry point takes its reference date as an argument.

pub mod benchmark;
pub mod cohort;
pub mod config;
pub mod error;
pub mod features;
pub mod insights;
pub mod normalizer;
pub mod percentile;
pub mod pipeline;
pub mod readiness;
pub mod store;
pub mod types;

pub use benchmark::{AggregationReport, BenchmarkAggregator};
pub use cohort::{cohort_key, widen_key, AgeBucket, CohortKey, LifeStage, SeverityTier};
pub use config::EngineConfig;
pub use error::{EngineError, StoreError};
pub use insights::{BenchmarkInsights, CorrelationInsight, InsightsPresenter};
pub use normalizer::{LogIngest, Normalizer};
pub use percentile::estimate_percentile;
pub use pipeline::InsightsEngine;
pub use readiness::{BatchReport, ReadinessScorer};
pub use store::{HealthStore, MemoryStore};

/// Engine version reported by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
