//! Analytics backend boundary
//!
//! The DR projection, feature contributions and MrDMD scores are computed by
//! an external service. This module defines the trait the dashboard talks
//! to, the HTTP client implementing it, and the wire decoding of each
//! endpoint.
//!
//! Endpoints (all GET, JSON):
//! - `/mgrData`: metric name -> {timestamp ms as string -> value}
//! - `/nodeData/{dims}`: `{data: [{timestamp, nodeId, <dim>: value, ...}]}`
//! - `/drTimeData`: `{dr_features: [...], feat_contributions: {...}}`
//! - `/mrdmd/{entities}/{start}/{end}/{dims}/{nonce}`: `{zscores, baselines}`

mod http;
pub mod wire;

pub use http::HttpBackend;

use async_trait::async_trait;
use chrono::DateTime;
use thiserror::Error;

use crate::recompute::RecomputeKey;
use crate::types::{AnomalySnapshot, DrSnapshot, MetricCatalog, NodeTable, Timestamp};

/// Text format of timestamps embedded in `/mrdmd` paths.
pub const PATH_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// ============================================================================
// Errors
// ============================================================================

/// A failed fetch: transport, non-2xx status, or an unusable body.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint}: server returned status {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{endpoint}: invalid JSON body: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{endpoint}: malformed payload: {message}")]
    Malformed {
        endpoint: &'static str,
        message: String,
    },

    #[error("Invalid backend URL: {0}")]
    Url(String),
}

// ============================================================================
// Trait
// ============================================================================

/// Source of every dataset the dashboard displays.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync + 'static {
    /// Manager metrics, partitioned into trigger / performance groups.
    async fn fetch_metrics(&self) -> Result<MetricCatalog, BackendError>;

    /// Per-node samples for the given dimensions.
    async fn fetch_node_data(&self, dimensions: &[String]) -> Result<NodeTable, BackendError>;

    /// DR points plus the feature-contribution matrix.
    async fn fetch_projection(&self) -> Result<DrSnapshot, BackendError>;

    /// Anomaly z-scores and baselines for one set of inputs.
    async fn fetch_anomalies(&self, key: &RecomputeKey) -> Result<AnomalySnapshot, BackendError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Path Segments
// ============================================================================

/// Comma-joined plain-text list, as every list-valued path segment is encoded.
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a timestamp in [`PATH_TIMESTAMP_FORMAT`].
pub fn format_path_timestamp(t: Timestamp) -> Result<String, BackendError> {
    DateTime::from_timestamp_millis(t)
        .map(|dt| dt.format(PATH_TIMESTAMP_FORMAT).to_string())
        .ok_or_else(|| BackendError::Url(format!("timestamp {t} out of range")))
}

pub fn node_data_segments(dimensions: &[String]) -> Vec<String> {
    vec!["nodeData".to_string(), join_list(dimensions)]
}

pub fn anomaly_segments(key: &RecomputeKey) -> Result<Vec<String>, BackendError> {
    Ok(vec![
        "mrdmd".to_string(),
        join_list(key.entities.iter().map(|e| e.as_str())),
        format_path_timestamp(key.window.start())?,
        format_path_timestamp(key.window.end())?,
        join_list(&key.dimensions),
        key.nonce.to_string(),
    ])
}
