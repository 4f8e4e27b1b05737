//! Data Cache - latest fetched snapshot per dataset
//!
//! Each dataset lives in its own slot holding an `Arc` of the last complete
//! snapshot plus its fetch status and a freshness stamp. Commits replace the
//! `Arc` wholesale, so a reader that cloned the previous `Arc` keeps a
//! complete old snapshot and the next reader sees a complete new one.
//! Failures never clear data already committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::{AnomalySnapshot, DrSnapshot, MetricCatalog, NodeTable};

// ============================================================================
// Keys / Status
// ============================================================================

/// Logical dataset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKey {
    /// `/mgrData` manager metrics
    Metrics,
    /// `/nodeData` per-node samples
    Nodes,
    /// `/drTimeData` DR points and contributions
    Projection,
    /// `/mrdmd` z-scores and baselines
    Anomaly,
}

impl DatasetKey {
    pub const ALL: [DatasetKey; 4] = [
        DatasetKey::Metrics,
        DatasetKey::Nodes,
        DatasetKey::Projection,
        DatasetKey::Anomaly,
    ];
}

impl std::fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetKey::Metrics => write!(f, "metrics"),
            DatasetKey::Nodes => write!(f, "nodes"),
            DatasetKey::Projection => write!(f, "projection"),
            DatasetKey::Anomaly => write!(f, "anomaly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DatasetStatus {
    /// Never requested
    #[default]
    Absent,
    /// A fetch is outstanding; previous data (if any) is still served
    Pending,
    Ready,
    /// The last fetch failed; previous data (if any) is still served
    Failed { message: String },
}

/// Status and freshness of one slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotMeta {
    pub status: DatasetStatus,
    /// Cache-wide monotonic commit counter at the last successful commit (0 = never)
    pub stamp: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One dataset: the last complete snapshot and its metadata.
#[derive(Debug, Clone)]
pub struct DatasetSlot<T> {
    data: Option<Arc<T>>,
    meta: SlotMeta,
}

impl<T> Default for DatasetSlot<T> {
    fn default() -> Self {
        Self {
            data: None,
            meta: SlotMeta::default(),
        }
    }
}

impl<T> DatasetSlot<T> {
    pub fn data(&self) -> Option<&Arc<T>> {
        self.data.as_ref()
    }

    pub fn status(&self) -> &DatasetStatus {
        &self.meta.status
    }

    pub fn stamp(&self) -> u64 {
        self.meta.stamp
    }

    pub fn meta(&self) -> &SlotMeta {
        &self.meta
    }

    pub fn is_ready(&self) -> bool {
        self.data.is_some()
    }
}

/// Row of the `/datasets` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub key: DatasetKey,
    pub has_data: bool,
    #[serde(flatten)]
    pub meta: SlotMeta,
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DataCache {
    metrics: DatasetSlot<MetricCatalog>,
    nodes: DatasetSlot<NodeTable>,
    projection: DatasetSlot<DrSnapshot>,
    anomaly: DatasetSlot<AnomalySnapshot>,
    commits: u64,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &DatasetSlot<MetricCatalog> {
        &self.metrics
    }

    pub fn nodes(&self) -> &DatasetSlot<NodeTable> {
        &self.nodes
    }

    pub fn projection(&self) -> &DatasetSlot<DrSnapshot> {
        &self.projection
    }

    pub fn anomaly(&self) -> &DatasetSlot<AnomalySnapshot> {
        &self.anomaly
    }

    pub fn meta(&self, key: DatasetKey) -> &SlotMeta {
        match key {
            DatasetKey::Metrics => &self.metrics.meta,
            DatasetKey::Nodes => &self.nodes.meta,
            DatasetKey::Projection => &self.projection.meta,
            DatasetKey::Anomaly => &self.anomaly.meta,
        }
    }

    fn meta_mut(&mut self, key: DatasetKey) -> &mut SlotMeta {
        match key {
            DatasetKey::Metrics => &mut self.metrics.meta,
            DatasetKey::Nodes => &mut self.nodes.meta,
            DatasetKey::Projection => &mut self.projection.meta,
            DatasetKey::Anomaly => &mut self.anomaly.meta,
        }
    }

    fn has_data(&self, key: DatasetKey) -> bool {
        match key {
            DatasetKey::Metrics => self.metrics.is_ready(),
            DatasetKey::Nodes => self.nodes.is_ready(),
            DatasetKey::Projection => self.projection.is_ready(),
            DatasetKey::Anomaly => self.anomaly.is_ready(),
        }
    }

    pub fn status(&self, key: DatasetKey) -> &DatasetStatus {
        &self.meta(key).status
    }

    pub fn mark_pending(&mut self, key: DatasetKey) {
        self.meta_mut(key).status = DatasetStatus::Pending;
    }

    /// Record a failed fetch. Committed data stays in place.
    pub fn mark_failed(&mut self, key: DatasetKey, message: impl Into<String>) {
        let message = message.into();
        warn!(dataset = %key, error = %message, "Dataset fetch failed");
        self.meta_mut(key).status = DatasetStatus::Failed { message };
    }

    /// Drop a pending status without a result (request abandoned).
    pub fn settle(&mut self, key: DatasetKey) {
        let ready = self.has_data(key);
        let meta = self.meta_mut(key);
        if meta.status == DatasetStatus::Pending {
            meta.status = if ready {
                DatasetStatus::Ready
            } else {
                DatasetStatus::Absent
            };
        }
    }

    fn next_meta(&mut self) -> SlotMeta {
        self.commits += 1;
        SlotMeta {
            status: DatasetStatus::Ready,
            stamp: self.commits,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn commit_metrics(&mut self, catalog: MetricCatalog) -> u64 {
        let meta = self.next_meta();
        debug!(dataset = %DatasetKey::Metrics, stamp = meta.stamp, metrics = catalog.len(), "Committed");
        self.metrics = DatasetSlot {
            data: Some(Arc::new(catalog)),
            meta,
        };
        self.commits
    }

    pub fn commit_nodes(&mut self, table: NodeTable) -> u64 {
        let meta = self.next_meta();
        debug!(dataset = %DatasetKey::Nodes, stamp = meta.stamp, rows = ?table.row_count(), "Committed");
        self.nodes = DatasetSlot {
            data: Some(Arc::new(table)),
            meta,
        };
        self.commits
    }

    pub fn commit_projection(&mut self, snapshot: DrSnapshot) -> u64 {
        if let Some(matrix) = &snapshot.contributions {
            let missing = matrix.missing_rows();
            if !missing.is_empty() {
                warn!(
                    features = matrix.features.len(),
                    rows = matrix.weights.len(),
                    missing = ?missing,
                    "Contribution matrix shorter than its feature list"
                );
            }
        }
        let meta = self.next_meta();
        debug!(dataset = %DatasetKey::Projection, stamp = meta.stamp, points = snapshot.points.len(), "Committed");
        self.projection = DatasetSlot {
            data: Some(Arc::new(snapshot)),
            meta,
        };
        self.commits
    }

    pub fn commit_anomaly(&mut self, snapshot: AnomalySnapshot) -> u64 {
        let meta = self.next_meta();
        debug!(dataset = %DatasetKey::Anomaly, stamp = meta.stamp, entities = snapshot.zscores.len(), "Committed");
        self.anomaly = DatasetSlot {
            data: Some(Arc::new(snapshot)),
            meta,
        };
        self.commits
    }

    pub fn datasets(&self) -> Vec<DatasetInfo> {
        DatasetKey::ALL
            .iter()
            .map(|&key| DatasetInfo {
                key,
                has_data: self.has_data(key),
                meta: self.meta(key).clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;

    #[test]
    fn test_commit_replaces_wholesale() {
        let mut cache = DataCache::new();
        let mut first = AnomalySnapshot::default();
        first.zscores.insert(EntityId::new("a"), Vec::new());
        cache.commit_anomaly(first);
        let held = Arc::clone(cache.anomaly().data().unwrap());

        let mut second = AnomalySnapshot::default();
        second.zscores.insert(EntityId::new("b"), Vec::new());
        cache.commit_anomaly(second);

        // The old reader still has the complete old snapshot.
        assert!(held.zscores.contains_key(&EntityId::new("a")));
        let now = cache.anomaly().data().unwrap();
        assert!(!now.zscores.contains_key(&EntityId::new("a")));
        assert!(now.zscores.contains_key(&EntityId::new("b")));
    }

    #[test]
    fn test_stamps_are_monotonic_across_datasets() {
        let mut cache = DataCache::new();
        let s1 = cache.commit_metrics(MetricCatalog::default());
        let s2 = cache.commit_projection(DrSnapshot::default());
        assert!(s2 > s1);
        assert_eq!(cache.projection().stamp(), s2);
        assert!(cache.projection().meta().updated_at.is_some());
    }

    #[test]
    fn test_failure_keeps_data() {
        let mut cache = DataCache::new();
        cache.commit_anomaly(AnomalySnapshot::default());
        cache.mark_pending(DatasetKey::Anomaly);
        cache.mark_failed(DatasetKey::Anomaly, "HTTP 500");
        assert!(cache.anomaly().is_ready());
        assert!(matches!(
            cache.status(DatasetKey::Anomaly),
            DatasetStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_settle_restores_status() {
        let mut cache = DataCache::new();
        cache.mark_pending(DatasetKey::Anomaly);
        cache.settle(DatasetKey::Anomaly);
        assert_eq!(cache.status(DatasetKey::Anomaly), &DatasetStatus::Absent);

        cache.commit_anomaly(AnomalySnapshot::default());
        cache.mark_pending(DatasetKey::Anomaly);
        cache.settle(DatasetKey::Anomaly);
        assert_eq!(cache.status(DatasetKey::Anomaly), &DatasetStatus::Ready);
    }

    #[test]
    fn test_datasets_listing() {
        let cache = DataCache::new();
        let rows = cache.datasets();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| !r.has_data && r.meta.stamp == 0));
    }
}
