//! Per-node dimension samples

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::{EntityId, MetricSeries, Timestamp};

/// One row of `/nodeData`: a node's value for one dimension at one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSample {
    pub timestamp: Timestamp,
    pub node: EntityId,
    pub value: Option<f64>,
}

/// A fetched column does not line up with the columns already held.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Column '{dimension}' has {actual} rows, expected {expected}")]
pub struct ShapeMismatch {
    pub dimension: String,
    pub expected: usize,
    pub actual: usize,
}

/// Column store of node samples keyed by dimension name.
///
/// Every column has one row per (node, time bucket), so all columns share
/// the same length.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeTable {
    columns: BTreeMap<String, Vec<NodeSample>>,
}

impl NodeTable {
    /// Build a table from columns fetched together in one response.
    pub fn from_columns(columns: BTreeMap<String, Vec<NodeSample>>) -> Result<Self, ShapeMismatch> {
        let mut table = Self::default();
        for (dimension, samples) in columns {
            table.check_shape(&dimension, samples.len())?;
            table.columns.insert(dimension, samples);
        }
        Ok(table)
    }

    /// Rows per column, `None` while the table is empty.
    pub fn row_count(&self) -> Option<usize> {
        self.columns.values().next().map(Vec::len)
    }

    pub fn has_column(&self, dimension: &str) -> bool {
        self.columns.contains_key(dimension)
    }

    pub fn column(&self, dimension: &str) -> Option<&[NodeSample]> {
        self.columns.get(dimension).map(Vec::as_slice)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// A copy of this table with one more column.
    ///
    /// Rejects the column when its length differs from the existing columns.
    pub fn with_column(
        &self,
        dimension: &str,
        samples: Vec<NodeSample>,
    ) -> Result<NodeTable, ShapeMismatch> {
        self.check_shape(dimension, samples.len())?;
        let mut next = self.clone();
        next.columns.insert(dimension.to_string(), samples);
        Ok(next)
    }

    pub fn take_column(mut self, dimension: &str) -> Option<Vec<NodeSample>> {
        self.columns.remove(dimension)
    }

    pub fn entities(&self) -> BTreeSet<EntityId> {
        self.columns
            .values()
            .flatten()
            .map(|s| s.node.clone())
            .collect()
    }

    /// Time series of one node for one dimension. Later duplicates win.
    pub fn series_for(&self, dimension: &str, entity: &EntityId) -> Option<MetricSeries> {
        let column = self.columns.get(dimension)?;
        let samples: BTreeMap<Timestamp, Option<f64>> = column
            .iter()
            .filter(|s| &s.node == entity)
            .map(|s| (s.timestamp, s.value))
            .collect();
        if samples.is_empty() {
            return None;
        }
        Some(MetricSeries::from_map(dimension, samples))
    }

    fn check_shape(&self, dimension: &str, actual: usize) -> Result<(), ShapeMismatch> {
        match self.row_count() {
            Some(expected) if expected != actual => Err(ShapeMismatch {
                dimension: dimension.to_string(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }
}
