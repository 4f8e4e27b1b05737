//! Timeline (context) panel: full-extent area chart with the brush drawn at
//! the active window.
//!
//! The x axis is the Window Controller's [`AxisMapping`], so brush pixels in
//! this scene are exactly the pixels a gesture over it must carry.

use serde::{Deserialize, Serialize};

use super::{area_segments, LinearScale, Point};
use crate::config::PanelGeometry;
use crate::types::{MetricSeries, TimeWindow};
use crate::window::AxisMapping;

/// Brush rectangle in panel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushRect {
    pub x0: f64,
    pub x1: f64,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineScene {
    pub metric: String,
    pub geometry: PanelGeometry,
    pub axis: Option<AxisMapping>,
    pub baseline_y: f64,
    pub segments: Vec<Vec<Point>>,
    pub brush: Option<BrushRect>,
}

pub fn render(
    series: &MetricSeries,
    axis: Option<&AxisMapping>,
    window: Option<&TimeWindow>,
    geometry: PanelGeometry,
) -> TimelineScene {
    let y_max = series.max_value().filter(|m| *m > 0.0).unwrap_or(1.0);
    let y = LinearScale::new((0.0, y_max), geometry.y_range());

    let (segments, brush) = match axis {
        Some(axis) => {
            let segments = area_segments(series, |p| axis.to_px(p.timestamp), &y);
            let brush = window.map(|w| BrushRect {
                x0: axis.to_px(w.start()),
                x1: axis.to_px(w.end()),
                window: *w,
            });
            (segments, brush)
        }
        None => (Vec::new(), None),
    };

    TimelineScene {
        metric: series.name().to_string(),
        geometry,
        axis: axis.copied(),
        baseline_y: y.apply(0.0),
        segments,
        brush,
    }
}
