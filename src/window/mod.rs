//! Window Controller - brushable time-range selection
//!
//! Owns the timeline's pixel-to-time mapping, turns brush gestures into a
//! [`TimeWindow`] and publishes it to the Selection Store. It is the only
//! writer of the window. Dependent series panels receive the window (and, for
//! the timeline, the [`AxisMapping`]) explicitly instead of reading another
//! panel's rendering state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DashboardConfig, PanelGeometry};
use crate::selection::SelectionStore;
use crate::types::{MetricSeries, TimeWindow, Timestamp};

// ============================================================================
// Axis Mapping
// ============================================================================

/// Affine mapping between a time domain and a horizontal pixel range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    domain: TimeWindow,
    range: (f64, f64),
}

impl AxisMapping {
    pub fn new(domain: TimeWindow, range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> TimeWindow {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// Pixel position of a timestamp. A zero-width domain maps to the range start.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_px(&self, t: Timestamp) -> f64 {
        let width = self.domain.width();
        if width == 0 {
            return self.range.0;
        }
        let frac = (t - self.domain.start()) as f64 / width as f64;
        self.range.0 + frac * (self.range.1 - self.range.0)
    }

    /// Timestamp under a pixel, with the pixel clamped into the range first.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn to_time(&self, px: f64) -> Timestamp {
        let (r0, r1) = self.range;
        let span = r1 - r0;
        if span == 0.0 {
            return self.domain.start();
        }
        let frac = ((px - r0) / span).clamp(0.0, 1.0);
        let t = self.domain.start() as f64 + frac * self.domain.width() as f64;
        (t.round() as Timestamp).clamp(self.domain.start(), self.domain.end())
    }
}

// ============================================================================
// Policy / Gesture
// ============================================================================

/// Default window as a central sub-range of the series, by sample index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPolicy {
    pub start_fraction: f64,
    pub end_fraction: f64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            start_fraction: crate::config::defaults::DEFAULT_WINDOW_START_FRACTION,
            end_fraction: crate::config::defaults::DEFAULT_WINDOW_END_FRACTION,
        }
    }
}

impl WindowPolicy {
    /// Window between the samples at `start_fraction` and `end_fraction` of
    /// the series length. Falls back to the full extent when those samples
    /// coincide (very short series), and to `None` when the extent itself
    /// has zero width.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn default_window(&self, timestamps: &[Timestamp]) -> Option<TimeWindow> {
        let (first, last) = (*timestamps.first()?, *timestamps.last()?);
        let n = timestamps.len();
        let index = |frac: f64| ((n as f64 * frac).floor() as usize).min(n - 1);
        let start = timestamps[index(self.start_fraction)];
        let end = timestamps[index(self.end_fraction)];
        if start < end {
            TimeWindow::new(start, end).ok()
        } else if first < last {
            TimeWindow::new(first, last).ok()
        } else {
            None
        }
    }
}

/// A horizontal drag over the timeline, in panel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushGesture {
    pub start_px: f64,
    pub end_px: f64,
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone)]
pub struct WindowController {
    policy: WindowPolicy,
    geometry: PanelGeometry,
    timestamps: Vec<Timestamp>,
    axis: Option<AxisMapping>,
}

impl WindowController {
    pub fn new(policy: WindowPolicy, geometry: PanelGeometry) -> Self {
        Self {
            policy,
            geometry,
            timestamps: Vec::new(),
            axis: None,
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(
            WindowPolicy {
                start_fraction: config.window.default_start_fraction,
                end_fraction: config.window.default_end_fraction,
            },
            config.panels.timeline,
        )
    }

    /// Overall time extent of the current timeline series.
    pub fn extent(&self) -> Option<TimeWindow> {
        self.axis.map(|a| a.domain())
    }

    /// The timeline's pixel mapping, shared with panels that draw against it.
    pub fn axis(&self) -> Option<&AxisMapping> {
        self.axis.as_ref()
    }

    pub fn default_window(&self) -> Option<TimeWindow> {
        self.policy.default_window(&self.timestamps)
    }

    /// Adopt a new timeline series.
    ///
    /// An active window is clamped to the new extent; when it no longer
    /// intersects (or only touches it at a single instant) it resets to the
    /// default policy window. A zero-width window is never committed; the
    /// prior window stays when no valid one exists. Returns the window in
    /// force afterwards.
    pub fn load_series(
        &mut self,
        series: &MetricSeries,
        store: &mut SelectionStore,
    ) -> Option<TimeWindow> {
        self.timestamps = series.timestamps().collect();
        let Some(extent) = series.extent() else {
            debug!(series = %series.name(), "Timeline series is empty, window left unchanged");
            self.axis = None;
            return store.state().window;
        };
        self.axis = Some(AxisMapping::new(extent, self.geometry.x_range()));

        let current = store.state().window;
        let target = match current.map(|w| (w, w.intersection(&extent))) {
            Some((_, Some(clamped))) if !clamped.is_degenerate() => Some(clamped),
            Some((w, _)) => {
                info!(window = %w, extent = %extent, "Window no longer intersects data, resetting");
                self.default_window()
            }
            None => self.default_window(),
        };

        let target = target.filter(|w| !w.is_degenerate());
        if let Some(window) = target {
            if current != Some(window) {
                store.set_window(window);
            }
        }
        target.or(current)
    }

    /// Commit the window selected by a brush gesture.
    ///
    /// A cleared gesture (`None`), a gesture before any data arrived, or one
    /// that collapses to zero width leaves the prior window unchanged.
    pub fn brush(
        &mut self,
        gesture: Option<BrushGesture>,
        store: &mut SelectionStore,
    ) -> Option<TimeWindow> {
        let gesture = gesture?;
        let axis = self.axis?;
        if !gesture.start_px.is_finite() || !gesture.end_px.is_finite() {
            return None;
        }
        let lo = gesture.start_px.min(gesture.end_px);
        let hi = gesture.start_px.max(gesture.end_px);
        let start = axis.to_time(lo);
        let end = axis.to_time(hi);
        if start >= end {
            debug!(start_px = lo, end_px = hi, "Zero-width brush ignored");
            return None;
        }
        let window = TimeWindow::new(start, end).ok()?;
        store.set_window(window);
        Some(window)
    }

    /// Programmatic reset to the default policy window.
    pub fn reset(&mut self, store: &mut SelectionStore) -> Option<TimeWindow> {
        let window = self.default_window()?;
        store.set_window(window);
        Some(window)
    }

    /// Sub-series of `series` inside the active window (the full series when
    /// no window is set).
    pub fn filter(series: &MetricSeries, window: Option<&TimeWindow>) -> MetricSeries {
        match window {
            Some(w) => series.windowed(w),
            None => series.clone(),
        }
    }
}
