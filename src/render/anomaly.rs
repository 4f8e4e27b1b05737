//! Anomaly Renderer - MrDMD z-score heatmap
//!
//! One row per selected entity, one column per time bucket present in the
//! committed snapshot. Cells carry the raw z-score and its level; baseline
//! rows ride along and are flagged editable in baseline-edit mode.

use serde::{Deserialize, Serialize};

use super::{cluster_color, LinearScale};
use crate::config::{AnomalyConfig, PanelGeometry};
use crate::selection::SelectionState;
use crate::types::{AnomalyLevel, AnomalySnapshot, ClusterId, DrSnapshot, EntityId, ScoreSample, TimeBucket};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCell {
    pub bucket: TimeBucket,
    pub x: f64,
    pub z: Option<f64>,
    pub level: Option<AnomalyLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub entity: EntityId,
    pub y: f64,
    pub hovered: bool,
    pub cluster: Option<ClusterId>,
    pub cluster_color: Option<String>,
    pub cells: Vec<AnomalyCell>,
    pub baseline: Vec<ScoreSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScene {
    pub geometry: PanelGeometry,
    pub buckets: Vec<TimeBucket>,
    pub cell_width: f64,
    pub row_height: f64,
    pub rows: Vec<AnomalyRow>,
    pub baseline_edit_mode: bool,
    /// A recompute for newer inputs is in flight; rows show the last result
    pub pending: bool,
    /// Last recompute failure, if the latest request failed
    pub error: Option<String>,
}

impl AnomalyScene {
    /// Count of cells at `level`.
    pub fn count(&self, level: AnomalyLevel) -> usize {
        self.rows
            .iter()
            .flat_map(|r| &r.cells)
            .filter(|c| c.level == Some(level))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyRenderer {
    geometry: PanelGeometry,
    warning_sigma: f64,
    critical_sigma: f64,
}

impl AnomalyRenderer {
    pub fn new(geometry: PanelGeometry, config: &AnomalyConfig) -> Self {
        Self {
            geometry,
            warning_sigma: config.warning_sigma,
            critical_sigma: config.critical_sigma,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn render(
        &self,
        snapshot: Option<&AnomalySnapshot>,
        projection: Option<&DrSnapshot>,
        state: &SelectionState,
        pending: bool,
        error: Option<&str>,
    ) -> AnomalyScene {
        let buckets = snapshot.map(AnomalySnapshot::buckets).unwrap_or_default();
        let (left, right) = self.geometry.x_range();
        let (bottom, top) = self.geometry.y_range();
        let n_cols = buckets.len().max(1) as f64;
        let n_rows = state.selection.len().max(1) as f64;
        let col_x = LinearScale::new((0.0, n_cols), (left, right));
        let row_y = LinearScale::new((0.0, n_rows), (top, bottom));

        let rows = state
            .selection
            .iter()
            .enumerate()
            .map(|(i, entity)| {
                let zscores = snapshot.map(|s| s.zscores_for(entity)).unwrap_or_default();
                let cells = buckets
                    .iter()
                    .enumerate()
                    .map(|(j, &bucket)| {
                        let z = zscores
                            .iter()
                            .find(|s| s.bucket == bucket)
                            .and_then(|s| s.value);
                        AnomalyCell {
                            bucket,
                            x: col_x.apply(j as f64),
                            z,
                            level: z.map(|z| {
                                AnomalyLevel::classify(z, self.warning_sigma, self.critical_sigma)
                            }),
                        }
                    })
                    .collect();
                let cluster = projection.and_then(|p| p.cluster_of(entity));
                AnomalyRow {
                    entity: entity.clone(),
                    y: row_y.apply(i as f64),
                    hovered: state.hovered.as_ref() == Some(entity),
                    cluster,
                    cluster_color: cluster.map(|c| cluster_color(c).to_string()),
                    cells,
                    baseline: snapshot
                        .map(|s| s.baseline_for(entity).to_vec())
                        .unwrap_or_default(),
                }
            })
            .collect();

        AnomalyScene {
            geometry: self.geometry,
            buckets,
            cell_width: (right - left) / n_cols,
            row_height: (bottom - top) / n_rows,
            rows,
            baseline_edit_mode: state.baseline_edit_mode,
            pending,
            error: error.map(str::to_string),
        }
    }
}
