//! Error types for the insights engine
//!
//! Missing or malformed log data never surfaces here: it resolves to documented
//! defaults. These errors cover store failures, bad configuration and unreadable
//! ingest payloads.

use thiserror::Error;

/// Errors raised by a [`HealthStore`](crate::store::HealthStore) implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected write: {0}")]
    Rejected(String),

    #[error("Invalid store snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while scoring, aggregating or presenting insights
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse log payload: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
