//! Shared fixtures: an in-memory analytics backend with scripted datasets.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use farmscope::backend::{AnalyticsBackend, BackendError};
use farmscope::recompute::RecomputeKey;
use farmscope::types::{
    AnomalySnapshot, DrPoint, DrSnapshot, EntityId, FeatureContributionMatrix, MetricCatalog,
    MetricSeries, NodeSample, NodeTable, ScoreSample, SeriesPoint,
};

/// One anomaly call held open until the test answers it.
pub struct PendingAnomaly {
    pub key: RecomputeKey,
    pub reply: oneshot::Sender<Result<AnomalySnapshot, BackendError>>,
}

pub enum AnomalyMode {
    /// Answer immediately with scores derived from the request
    Auto,
    /// Hand every call to the test
    Manual(mpsc::UnboundedSender<PendingAnomaly>),
}

pub struct ScriptedBackend {
    pub metrics: Option<MetricCatalog>,
    pub projection: Option<DrSnapshot>,
    pub nodes: NodeTable,
    pub anomaly: AnomalyMode,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            metrics: Some(catalog()),
            projection: Some(projection()),
            nodes: node_table(&["bytes_out", "cpu_speed", "mem_free"], 10),
            anomaly: AnomalyMode::Auto,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn manual(mut self) -> (Self, mpsc::UnboundedReceiver<PendingAnomaly>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.anomaly = AnomalyMode::Manual(tx);
        (self, rx)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn unavailable(endpoint: &'static str) -> BackendError {
    BackendError::Malformed {
        endpoint,
        message: "scripted failure".to_string(),
    }
}

/// Scores stamped with the request nonce so tests can tell responses apart.
pub fn scores_for(key: &RecomputeKey) -> AnomalySnapshot {
    let mut snapshot = AnomalySnapshot::default();
    for entity in &key.entities {
        snapshot.zscores.insert(
            entity.clone(),
            vec![ScoreSample {
                bucket: 0,
                value: Some(key.nonce as f64),
            }],
        );
    }
    snapshot
}

#[async_trait]
impl AnalyticsBackend for ScriptedBackend {
    async fn fetch_metrics(&self) -> Result<MetricCatalog, BackendError> {
        self.record("mgrData");
        self.metrics.clone().ok_or_else(|| unavailable("mgrData"))
    }

    async fn fetch_node_data(&self, dimensions: &[String]) -> Result<NodeTable, BackendError> {
        self.record(format!("nodeData/{}", dimensions.join(",")));
        let columns = dimensions
            .iter()
            .filter_map(|d| self.nodes.column(d).map(|c| (d.clone(), c.to_vec())))
            .collect();
        NodeTable::from_columns(columns).map_err(|e| BackendError::Malformed {
            endpoint: "nodeData",
            message: e.to_string(),
        })
    }

    async fn fetch_projection(&self) -> Result<DrSnapshot, BackendError> {
        self.record("drTimeData");
        self.projection.clone().ok_or_else(|| unavailable("drTimeData"))
    }

    async fn fetch_anomalies(&self, key: &RecomputeKey) -> Result<AnomalySnapshot, BackendError> {
        self.record(format!("mrdmd/{}", key.nonce));
        match &self.anomaly {
            AnomalyMode::Auto => Ok(scores_for(key)),
            AnomalyMode::Manual(tx) => {
                let (reply, rx) = oneshot::channel();
                tx.send(PendingAnomaly {
                    key: key.clone(),
                    reply,
                })
                .map_err(|_| unavailable("mrdmd"))?;
                rx.await.map_err(|_| unavailable("mrdmd"))?
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Datasets
// ============================================================================

pub fn series(name: &str, n: i64) -> MetricSeries {
    MetricSeries::new(
        name,
        (0..n)
            .map(|i| SeriesPoint::new(i * 1000, Some((i % 4) as f64)))
            .collect(),
    )
    .unwrap()
}

pub fn catalog() -> MetricCatalog {
    MetricCatalog::partition([
        series("Activity_P1", 10),
        series("Missed Buffers_P1", 10),
        series("Data Driven Trigger_P1", 10),
        series("bytes_out", 10),
        series("cpu_speed", 10),
        series("mem_free", 10),
    ])
}

pub fn projection() -> DrSnapshot {
    let point = |id: &str, x: f64, y: f64, cluster: i64| DrPoint {
        entity: EntityId::new(id),
        x,
        y,
        cluster,
    };
    DrSnapshot {
        points: vec![
            point("n1", 0.0, 0.0, 0),
            point("n2", 0.1, 0.1, 0),
            point("n3", 1.0, 1.0, 1),
            point("n4", 0.9, 0.95, 1),
        ],
        contributions: Some(FeatureContributionMatrix {
            features: vec!["bytes_out".into(), "cpu_speed".into(), "mem_free".into()],
            order_col: vec![0, 1],
            weights: vec![vec![0.5, -0.2], vec![0.1, 0.9]],
        }),
    }
}

/// Every column holds `rows` samples spread over nodes n1..n4, starting at t=3000.
pub fn node_table(dimensions: &[&str], rows: usize) -> NodeTable {
    let columns: BTreeMap<String, Vec<NodeSample>> = dimensions
        .iter()
        .map(|d| {
            let samples = (0..rows)
                .map(|i| NodeSample {
                    timestamp: 3000 + (i / 4) as i64 * 1000,
                    node: EntityId::new(format!("n{}", i % 4 + 1)),
                    value: Some(i as f64),
                })
                .collect();
            ((*d).to_string(), samples)
        })
        .collect();
    NodeTable::from_columns(columns).unwrap()
}
