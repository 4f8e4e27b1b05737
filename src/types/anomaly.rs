//! MrDMD anomaly scores and baselines

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::EntityId;

/// Index of a time bucket in the decomposition output.
pub type TimeBucket = i64;

/// One value in an entity's per-bucket score or baseline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSample {
    pub bucket: TimeBucket,
    pub value: Option<f64>,
}

/// Z-scores and baselines for the current anomaly inputs.
///
/// Committed to the cache as a whole; never partially updated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalySnapshot {
    pub zscores: BTreeMap<EntityId, Vec<ScoreSample>>,
    pub baselines: BTreeMap<EntityId, Vec<ScoreSample>>,
}

impl AnomalySnapshot {
    pub fn zscores_for(&self, entity: &EntityId) -> &[ScoreSample] {
        self.zscores.get(entity).map_or(&[], Vec::as_slice)
    }

    pub fn baseline_for(&self, entity: &EntityId) -> &[ScoreSample] {
        self.baselines.get(entity).map_or(&[], Vec::as_slice)
    }

    /// Sorted union of every bucket present in the z-score sequences.
    pub fn buckets(&self) -> Vec<TimeBucket> {
        self.zscores
            .values()
            .flatten()
            .map(|s| s.bucket)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Anomaly Level
// ============================================================================

/// Severity level from a z-score check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyLevel {
    /// |z| below the warning threshold
    Normal,
    /// warning_sigma <= |z| < critical_sigma
    Warning,
    /// |z| >= critical_sigma
    Critical,
}

impl AnomalyLevel {
    pub fn classify(z: f64, warning_sigma: f64, critical_sigma: f64) -> Self {
        let magnitude = z.abs();
        if magnitude >= critical_sigma {
            AnomalyLevel::Critical
        } else if magnitude >= warning_sigma {
            AnomalyLevel::Warning
        } else {
            AnomalyLevel::Normal
        }
    }
}

impl std::fmt::Display for AnomalyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyLevel::Normal => write!(f, "NORMAL"),
            AnomalyLevel::Warning => write!(f, "WARNING"),
            AnomalyLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}
