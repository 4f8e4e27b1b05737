//! Shared data model for the farm dashboard
//!
//! This module defines the values every panel agrees on:
//! - `EntityId`: the join key between metric series, DR points and anomaly rows
//! - `MetricSeries` / `TimeWindow`: timestamped metric values and the active window
//! - `DrSnapshot`: DR projection points plus the feature-contribution matrix
//! - `AnomalySnapshot`: MrDMD z-scores and baselines per entity
//! - `NodeTable`: per-node, per-dimension samples
//! - `MetricCatalog`: manager metrics partitioned into trigger / performance groups

mod entity;
mod series;
mod projection;
mod anomaly;
mod node;
mod metrics;

pub use entity::*;
pub use series::*;
pub use projection::*;
pub use anomaly::*;
pub use node::*;
pub use metrics::*;

use thiserror::Error;

/// Invariant violations raised while constructing data-model values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("Series {series}: timestamps not strictly increasing at index {index}")]
    NonMonotonicTimestamps { series: String, index: usize },

    #[error("Inverted time window: start {start} > end {end}")]
    InvertedWindow { start: Timestamp, end: Timestamp },

    #[error("Invalid timestamp key '{0}'")]
    InvalidTimestamp(String),
}
