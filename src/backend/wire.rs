//! JSON wire formats of the analytics backend
//!
//! Decoders are lenient where the backend is known to vary (numeric or
//! string timestamps, float-typed cluster ids, several score encodings) and
//! strict where a wrong guess would silently corrupt a panel (unparsable
//! timestamp keys, fractional cluster ids).

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::BackendError;
use crate::types::{
    AnomalySnapshot, ClusterId, DrPoint, DrSnapshot, EntityId, FeatureContributionMatrix,
    MetricCatalog, MetricSeries, NodeSample, NodeTable, ScoreSample, TimeBucket, Timestamp,
};

pub const METRICS_ENDPOINT: &str = "mgrData";
pub const NODE_DATA_ENDPOINT: &str = "nodeData";
pub const PROJECTION_ENDPOINT: &str = "drTimeData";
pub const ANOMALY_ENDPOINT: &str = "mrdmd";

fn parse<'a, T: Deserialize<'a>>(endpoint: &'static str, body: &'a [u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|source| BackendError::Decode { endpoint, source })
}

fn malformed(endpoint: &'static str, message: impl Into<String>) -> BackendError {
    BackendError::Malformed {
        endpoint,
        message: message.into(),
    }
}

// ============================================================================
// /mgrData
// ============================================================================

/// Decode `/mgrData` and partition it into trigger / performance groups.
pub fn decode_metrics(body: &[u8]) -> Result<MetricCatalog, BackendError> {
    let raw: BTreeMap<String, BTreeMap<String, Option<f64>>> = parse(METRICS_ENDPOINT, body)?;
    let mut series = Vec::with_capacity(raw.len());
    for (name, samples) in raw {
        let mut points = BTreeMap::new();
        for (key, value) in samples {
            let t: Timestamp = key.trim().parse().map_err(|_| {
                malformed(
                    METRICS_ENDPOINT,
                    format!("metric '{name}': timestamp key '{key}' is not integer milliseconds"),
                )
            })?;
            points.insert(t, value);
        }
        series.push(MetricSeries::from_map(name, points));
    }
    Ok(MetricCatalog::partition(series))
}

// ============================================================================
// /nodeData
// ============================================================================

#[derive(Deserialize)]
struct NodeDataBody {
    data: Vec<Map<String, Value>>,
}

/// Timestamp as epoch milliseconds, an RFC 3339 string, or `%Y-%m-%d %H:%M:%S` (UTC).
pub fn parse_row_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .map(|dt| dt.and_utc().timestamp_millis())
                })
                .ok()
        }
        _ => None,
    }
}

fn node_id(value: &Value) -> Option<EntityId> {
    match value {
        Value::String(s) => Some(EntityId::new(s.clone())),
        Value::Number(n) => Some(EntityId::new(n.to_string())),
        _ => None,
    }
}

/// Decode `/nodeData/{dims}` into one column per requested dimension.
///
/// A dimension missing from a row is recorded as a gap for that row.
pub fn decode_node_data(body: &[u8], dimensions: &[String]) -> Result<NodeTable, BackendError> {
    let raw: NodeDataBody = parse(NODE_DATA_ENDPOINT, body)?;
    let mut columns: BTreeMap<String, Vec<NodeSample>> = dimensions
        .iter()
        .map(|d| (d.clone(), Vec::with_capacity(raw.data.len())))
        .collect();

    for (i, row) in raw.data.iter().enumerate() {
        let timestamp = row
            .get("timestamp")
            .and_then(parse_row_timestamp)
            .ok_or_else(|| malformed(NODE_DATA_ENDPOINT, format!("row {i}: bad or missing timestamp")))?;
        let node = row
            .get("nodeId")
            .and_then(node_id)
            .ok_or_else(|| malformed(NODE_DATA_ENDPOINT, format!("row {i}: bad or missing nodeId")))?;
        for (dimension, column) in &mut columns {
            column.push(NodeSample {
                timestamp,
                node: node.clone(),
                value: row
                    .get(dimension)
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite()),
            });
        }
    }

    NodeTable::from_columns(columns).map_err(|e| malformed(NODE_DATA_ENDPOINT, e.to_string()))
}

// ============================================================================
// /drTimeData
// ============================================================================

#[derive(Deserialize)]
struct DrBody {
    dr_features: Vec<WireDrPoint>,
    #[serde(default)]
    feat_contributions: Option<WireContributions>,
}

#[derive(Deserialize)]
struct WireDrPoint {
    #[serde(alias = "nodeId", alias = "node", alias = "id")]
    entity: Value,
    #[serde(alias = "dr_x", alias = "X")]
    x: f64,
    #[serde(alias = "dr_y", alias = "Y")]
    y: f64,
    #[serde(alias = "clusterId", alias = "label", default)]
    cluster: Option<f64>,
}

#[derive(Deserialize)]
struct WireContributions {
    features: Vec<String>,
    order_col: Vec<f64>,
    agg_feat_contrib_mat: Vec<Vec<f64>>,
}

fn cluster_id(raw: f64) -> Option<ClusterId> {
    (raw.is_finite() && raw.fract() == 0.0).then_some(raw as ClusterId)
}

/// Decode `/drTimeData`. Points without a cluster label get cluster -1 (noise).
pub fn decode_projection(body: &[u8]) -> Result<DrSnapshot, BackendError> {
    let raw: DrBody = parse(PROJECTION_ENDPOINT, body)?;

    let points = raw
        .dr_features
        .into_iter()
        .enumerate()
        .map(|(i, p)| -> Result<DrPoint, BackendError> {
            let entity = node_id(&p.entity)
                .ok_or_else(|| malformed(PROJECTION_ENDPOINT, format!("point {i}: bad entity id")))?;
            let cluster = match p.cluster {
                None => -1,
                Some(c) => cluster_id(c).ok_or_else(|| {
                    malformed(PROJECTION_ENDPOINT, format!("point {i}: cluster {c} is not an integer"))
                })?,
            };
            Ok(DrPoint {
                entity,
                x: p.x,
                y: p.y,
                cluster,
            })
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    let contributions = raw
        .feat_contributions
        .map(|fc| {
            let order_col = fc
                .order_col
                .iter()
                .map(|&c| {
                    cluster_id(c).ok_or_else(|| {
                        malformed(PROJECTION_ENDPOINT, format!("order_col entry {c} is not an integer"))
                    })
                })
                .collect::<Result<Vec<_>, BackendError>>()?;
            Ok::<_, BackendError>(FeatureContributionMatrix {
                features: fc.features,
                order_col,
                weights: fc.agg_feat_contrib_mat,
            })
        })
        .transpose()?;

    Ok(DrSnapshot {
        points,
        contributions,
    })
}

// ============================================================================
// /mrdmd
// ============================================================================

#[derive(Deserialize)]
struct AnomalyBody {
    zscores: BTreeMap<String, Vec<WireScore>>,
    #[serde(default)]
    baselines: BTreeMap<String, Vec<WireScore>>,
}

/// One score entry: a bare value (bucket = position), a `[bucket, value]`
/// pair, or an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireScore {
    Value(Option<f64>),
    Pair(TimeBucket, Option<f64>),
    Object {
        #[serde(alias = "t", alias = "timestamp")]
        bucket: TimeBucket,
        #[serde(alias = "z", alias = "score")]
        value: Option<f64>,
    },
}

fn scores(entries: Vec<WireScore>) -> Vec<ScoreSample> {
    let mut samples: Vec<ScoreSample> = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let (bucket, value) = match entry {
                WireScore::Value(v) => (i as TimeBucket, v),
                WireScore::Pair(b, v) | WireScore::Object { bucket: b, value: v } => (b, v),
            };
            ScoreSample {
                bucket,
                value: value.filter(|v| v.is_finite()),
            }
        })
        .collect();
    samples.sort_by_key(|s| s.bucket);
    samples
}

pub fn decode_anomalies(body: &[u8]) -> Result<AnomalySnapshot, BackendError> {
    let raw: AnomalyBody = parse(ANOMALY_ENDPOINT, body)?;
    let convert = |m: BTreeMap<String, Vec<WireScore>>| -> BTreeMap<EntityId, Vec<ScoreSample>> {
        m.into_iter()
            .map(|(entity, entries)| (EntityId::new(entity), scores(entries)))
            .collect()
    };
    Ok(AnomalySnapshot {
        zscores: convert(raw.zscores),
        baselines: convert(raw.baselines),
    })
}
