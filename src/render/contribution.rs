//! Contribution Matrix Renderer
//!
//! Two views over the same [`FeatureContributionMatrix`]: the per-metric bar
//! strip shown next to each dimension in the metric list, and the full
//! feature-by-cluster heatmap. Rows come from the authoritative feature list
//! and columns from `order_col`; a feature whose row lies past the end of the
//! weight matrix renders empty.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{cluster_color, diverging_color, LinearScale};
use crate::config::PanelGeometry;
use crate::types::{ClusterId, DrSnapshot, FeatureContributionMatrix};

/// One bar of a metric's contribution strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionBar {
    pub cluster: ClusterId,
    pub value: f64,
    pub color: String,
}

/// Contribution bars for one metric, in `order_col` order.
///
/// Empty when there is no matrix, the metric is not a listed feature, or its
/// row is missing from the weight matrix.
pub fn contribution_bars(
    matrix: Option<&FeatureContributionMatrix>,
    feature: &str,
) -> Vec<ContributionBar> {
    let Some(matrix) = matrix else {
        return Vec::new();
    };
    matrix
        .contributions(feature)
        .into_iter()
        .map(|c| ContributionBar {
            cluster: c.cluster,
            value: c.value,
            color: cluster_color(c.cluster).to_string(),
        })
        .collect()
}

// ============================================================================
// Heatmap
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatCell {
    pub cluster: ClusterId,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub feature: String,
    /// Feature is in the selected DimensionSet
    pub selected: bool,
    /// Row index lies past the end of the weight matrix
    pub missing: bool,
    pub y: f64,
    pub cells: Vec<HeatCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterColumn {
    pub cluster: ClusterId,
    pub x: f64,
    pub color: String,
    /// DR points assigned to this cluster
    pub members: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionScene {
    pub geometry: PanelGeometry,
    pub cell_width: f64,
    pub cell_height: f64,
    pub max_abs_weight: f64,
    pub columns: Vec<ClusterColumn>,
    pub rows: Vec<FeatureRow>,
}

/// Heatmap of the snapshot's contribution matrix, `None` without a matrix.
#[allow(clippy::cast_precision_loss)]
pub fn render(
    snapshot: &DrSnapshot,
    dimensions: &BTreeSet<String>,
    geometry: PanelGeometry,
) -> Option<ContributionScene> {
    let matrix = snapshot.contributions.as_ref()?;

    let mut members: BTreeMap<ClusterId, usize> = BTreeMap::new();
    for p in &snapshot.points {
        *members.entry(p.cluster).or_default() += 1;
    }

    let (left, right) = geometry.x_range();
    let (bottom, top) = geometry.y_range();
    let n_cols = matrix.order_col.len().max(1) as f64;
    let n_rows = matrix.features.len().max(1) as f64;
    let cell_width = (right - left) / n_cols;
    let cell_height = (bottom - top) / n_rows;
    let col_x = LinearScale::new((0.0, n_cols), (left, right));
    let row_y = LinearScale::new((0.0, n_rows), (top, bottom));

    let max_abs = matrix.max_abs_weight();
    let norm = if max_abs > 0.0 { max_abs } else { 1.0 };

    let columns = matrix
        .order_col
        .iter()
        .enumerate()
        .map(|(i, &cluster)| ClusterColumn {
            cluster,
            x: col_x.apply(i as f64),
            color: cluster_color(cluster).to_string(),
            members: members.get(&cluster).copied().unwrap_or(0),
        })
        .collect();

    let rows = matrix
        .features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let missing = i >= matrix.weights.len();
            if missing {
                debug!(feature = %feature, row = i, rows = matrix.weights.len(), "No contribution row");
            }
            FeatureRow {
                feature: feature.clone(),
                selected: dimensions.contains(feature),
                missing,
                y: row_y.apply(i as f64),
                cells: matrix
                    .contributions(feature)
                    .into_iter()
                    .map(|c| HeatCell {
                        cluster: c.cluster,
                        value: c.value,
                        color: diverging_color(c.value / norm),
                    })
                    .collect(),
            }
        })
        .collect();

    Some(ContributionScene {
        geometry,
        cell_width,
        cell_height,
        max_abs_weight: max_abs,
        columns,
        rows,
    })
}
