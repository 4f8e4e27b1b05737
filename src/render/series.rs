//! Series Renderer - one filled area chart per metric
//!
//! The windowed variant draws only the samples inside the active window,
//! against a time axis spanning exactly that window. When the metric also
//! exists as a node-data column, the hovered entity's own series is drawn
//! over the aggregate area.

use serde::{Deserialize, Serialize};

use super::{area_segments, LinearScale, Point};
use crate::config::PanelGeometry;
use crate::types::{EntityId, MetricSeries, TimeWindow};

/// The hovered entity's per-node line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverOverlay {
    pub entity: EntityId,
    pub segments: Vec<Vec<Point>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesScene {
    pub metric: String,
    pub geometry: PanelGeometry,
    /// Time span covered by the x axis, `None` when there is nothing to draw
    pub x_domain: Option<TimeWindow>,
    pub y_max: f64,
    /// Pixel y of the area baseline (value 0)
    pub baseline_y: f64,
    /// Area top edges, one per run of present values
    pub segments: Vec<Vec<Point>>,
    pub hover: Option<HoverOverlay>,
    /// Samples inside the window, present or missing
    pub point_count: usize,
}

impl SeriesScene {
    /// Flat panel: the window excludes every sample.
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesRenderer {
    geometry: PanelGeometry,
}

impl SeriesRenderer {
    pub fn new(geometry: PanelGeometry) -> Self {
        Self { geometry }
    }

    /// Derive the scene for `series` under `window`.
    ///
    /// `hovered` carries the hovered entity and its per-node series for this
    /// metric, when both exist.
    #[allow(clippy::cast_precision_loss)]
    pub fn render(
        &self,
        series: &MetricSeries,
        window: Option<&TimeWindow>,
        hovered: Option<(&EntityId, &MetricSeries)>,
    ) -> SeriesScene {
        let visible = match window {
            Some(w) => series.windowed(w),
            None => series.clone(),
        };
        let overlay = hovered.map(|(entity, s)| {
            let s = match window {
                Some(w) => s.windowed(w),
                None => s.clone(),
            };
            (entity.clone(), s)
        });

        let x_domain = window.copied().or_else(|| visible.extent());
        let y_max = [visible.max_value(), overlay.as_ref().and_then(|(_, s)| s.max_value())]
            .into_iter()
            .flatten()
            .fold(0.0_f64, f64::max);
        let y_max = if y_max > 0.0 { y_max } else { 1.0 };

        let y = LinearScale::new((0.0, y_max), self.geometry.y_range());
        let baseline_y = y.apply(0.0);

        let Some(domain) = x_domain else {
            return SeriesScene {
                metric: series.name().to_string(),
                geometry: self.geometry,
                x_domain: None,
                y_max,
                baseline_y,
                segments: Vec::new(),
                hover: None,
                point_count: 0,
            };
        };
        let x = LinearScale::new(
            (domain.start() as f64, domain.end() as f64),
            self.geometry.x_range(),
        );
        let to_x = |p: &crate::types::SeriesPoint| x.apply(p.timestamp as f64);

        SeriesScene {
            metric: series.name().to_string(),
            geometry: self.geometry,
            x_domain: Some(domain),
            y_max,
            baseline_y,
            segments: area_segments(&visible, to_x, &y),
            hover: overlay.map(|(entity, s)| HoverOverlay {
                entity,
                segments: area_segments(&s, to_x, &y),
            }),
            point_count: visible.len(),
        }
    }
}
