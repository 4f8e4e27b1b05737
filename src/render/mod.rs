//! Scene derivation for every panel
//!
//! Each renderer is a pure function from a slice of the Data Cache and a
//! slice of the Selection State to a declarative scene. Scenes are plain
//! serializable values in panel pixel space; whatever draws them only has
//! to diff and paint. No renderer reads another renderer's output.

pub mod anomaly;
pub mod contribution;
pub mod projection;
pub mod series;
pub mod timeline;

pub use anomaly::{AnomalyCell, AnomalyRenderer, AnomalyRow, AnomalyScene};
pub use contribution::{ClusterColumn, ContributionBar, ContributionScene, FeatureRow, HeatCell};
pub use projection::{ProjectionGesture, ProjectionMapping, ProjectionMark, ProjectionRenderer, ProjectionScene};
pub use series::{HoverOverlay, SeriesRenderer, SeriesScene};
pub use timeline::{BrushRect, TimelineScene};

use serde::{Deserialize, Serialize};

use crate::cache::{DatasetSlot, DatasetStatus};
use crate::types::{ClusterId, MetricSeries, SeriesPoint};

// ============================================================================
// Shared Primitives
// ============================================================================

/// A point in panel pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Affine map from a numeric domain to a pixel range.
///
/// A zero-width domain maps every value to the middle of the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn apply(&self, v: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d1 == d0 {
            return (r0 + r1) / 2.0;
        }
        r0 + (v - d0) / (d1 - d0) * (r1 - r0)
    }

    pub fn invert(&self, px: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if r1 == r0 {
            return d0;
        }
        d0 + (px - r0) / (r1 - r0) * (d1 - d0)
    }
}

/// Top edges of the filled area, one polyline per run of present values.
///
/// Missing samples split the area; they are never bridged or drawn as zero.
pub(crate) fn area_segments(
    series: &MetricSeries,
    x: impl Fn(&SeriesPoint) -> f64,
    y: &LinearScale,
) -> Vec<Vec<Point>> {
    series
        .present_runs()
        .into_iter()
        .map(|run| {
            run.iter()
                .filter_map(|p| p.value.map(|v| Point::new(x(p), y.apply(v))))
                .collect()
        })
        .collect()
}

// ============================================================================
// Panel Gating
// ============================================================================

/// A panel's scene, gated on its own dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "scene", rename_all = "snake_case")]
pub enum PanelScene<T> {
    Loading,
    Failed { message: String },
    Ready(T),
}

impl<T> PanelScene<T> {
    /// Ready when the slot has data (even after a later failed refresh);
    /// otherwise the slot's failure or a loading placeholder.
    pub fn gate<S>(slot: &DatasetSlot<S>, derive: impl FnOnce(&S) -> T) -> Self {
        match (slot.data(), slot.status()) {
            (Some(data), _) => PanelScene::Ready(derive(&**data)),
            (None, DatasetStatus::Failed { message }) => PanelScene::Failed {
                message: message.clone(),
            },
            (None, _) => PanelScene::Loading,
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            PanelScene::Ready(scene) => Some(scene),
            _ => None,
        }
    }
}

// ============================================================================
// Colour
// ============================================================================

const CATEGORY10: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Colour for noise points (negative cluster ids).
pub const NOISE_COLOR: &str = "#c7c7c7";

/// Categorical colour of a DR cluster.
pub fn cluster_color(cluster: ClusterId) -> &'static str {
    usize::try_from(cluster).map_or(NOISE_COLOR, |c| CATEGORY10[c % CATEGORY10.len()])
}

/// Diverging white-centred colour for a weight normalised to [-1, 1].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn diverging_color(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(-1.0, 1.0) } else { 0.0 };
    // Positive towards #d62728, negative towards #1f77b4.
    let (r, g, b) = if t >= 0.0 { (214.0, 39.0, 40.0) } else { (31.0, 119.0, 180.0) };
    let k = t.abs();
    let mix = |c: f64| (255.0 + (c - 255.0) * k).round() as u8;
    format!("#{:02x}{:02x}{:02x}", mix(r), mix(g), mix(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DataCache;

    #[test]
    fn test_linear_scale_apply_invert() {
        let s = LinearScale::new((0.0, 10.0), (100.0, 0.0));
        assert!((s.apply(2.5) - 75.0).abs() < 1e-9);
        assert!((s.invert(75.0) - 2.5).abs() < 1e-9);
        let flat = LinearScale::new((3.0, 3.0), (0.0, 50.0));
        assert!((flat.apply(3.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_cluster_colors() {
        assert_eq!(cluster_color(0), "#1f77b4");
        assert_eq!(cluster_color(10), "#1f77b4");
        assert_eq!(cluster_color(-1), NOISE_COLOR);
    }

    #[test]
    fn test_diverging_endpoints() {
        assert_eq!(diverging_color(0.0), "#ffffff");
        assert_eq!(diverging_color(1.0), "#d62728");
        assert_eq!(diverging_color(-1.0), "#1f77b4");
        assert_eq!(diverging_color(f64::NAN), "#ffffff");
    }

    #[test]
    fn test_gate_follows_slot() {
        let mut cache = DataCache::new();
        let scene: PanelScene<usize> = PanelScene::gate(cache.projection(), |s| s.points.len());
        assert_eq!(scene, PanelScene::Loading);

        cache.mark_failed(crate::cache::DatasetKey::Projection, "down");
        let scene: PanelScene<usize> = PanelScene::gate(cache.projection(), |s| s.points.len());
        assert!(matches!(scene, PanelScene::Failed { .. }));

        cache.commit_projection(crate::types::DrSnapshot::default());
        let scene: PanelScene<usize> = PanelScene::gate(cache.projection(), |s| s.points.len());
        assert_eq!(scene.ready(), Some(&0));
    }
}
