//! Metric series and time windows

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::TypeError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

// ============================================================================
// Time Window
// ============================================================================

/// Closed time range `[start, end]` with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct TimeWindow {
    start: Timestamp,
    end: Timestamp,
}

#[derive(Deserialize)]
struct RawWindow {
    start: Timestamp,
    end: Timestamp,
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = TypeError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, TypeError> {
        if start > end {
            return Err(TypeError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn width(&self) -> i64 {
        self.end - self.start
    }

    /// True when the window covers a single instant.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// Overlap of two windows, `None` when they are disjoint.
    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeWindow { start, end })
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// ============================================================================
// Metric Series
// ============================================================================

/// One sample of a metric. `value == None` is an explicit gap, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(timestamp: Timestamp, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered samples of one metric, timestamps strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    name: String,
    points: Vec<SeriesPoint>,
}

impl MetricSeries {
    /// Build a series, rejecting out-of-order or duplicate timestamps.
    pub fn new(name: impl Into<String>, points: Vec<SeriesPoint>) -> Result<Self, TypeError> {
        let name = name.into();
        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[0].timestamp >= pair[1].timestamp)
        {
            return Err(TypeError::NonMonotonicTimestamps {
                series: name,
                index: index + 1,
            });
        }
        Ok(Self { name, points })
    }

    /// Build a series from a timestamp-keyed map (ordered and unique by construction).
    pub fn from_map(name: impl Into<String>, samples: BTreeMap<Timestamp, Option<f64>>) -> Self {
        Self {
            name: name.into(),
            points: samples
                .into_iter()
                .map(|(timestamp, value)| SeriesPoint {
                    timestamp,
                    value: value.filter(|v| v.is_finite()),
                })
                .collect(),
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First and last timestamp, `None` for an empty series.
    pub fn extent(&self) -> Option<TimeWindow> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some(TimeWindow {
            start: first.timestamp,
            end: last.timestamp,
        })
    }

    /// Exactly the points whose timestamp lies in `[window.start, window.end]`.
    ///
    /// Idempotent: filtering the result again by the same window is a no-op.
    pub fn windowed(&self, window: &TimeWindow) -> MetricSeries {
        let lo = self.points.partition_point(|p| p.timestamp < window.start);
        let hi = self.points.partition_point(|p| p.timestamp <= window.end);
        MetricSeries {
            name: self.name.clone(),
            points: self.points[lo..hi.max(lo)].to_vec(),
        }
    }

    /// Maximal runs of consecutive present values. Gaps split runs.
    pub fn present_runs(&self) -> Vec<&[SeriesPoint]> {
        self.points
            .split(|p| p.value.is_none())
            .filter(|run| !run.is_empty())
            .collect()
    }

    /// Largest present value.
    pub fn max_value(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.value)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.points.iter().map(|p| p.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(Timestamp, Option<f64>)]) -> MetricSeries {
        MetricSeries::new(
            "bytes_out",
            points.iter().map(|&(t, v)| SeriesPoint::new(t, v)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let err = MetricSeries::new(
            "m",
            vec![SeriesPoint::new(10, Some(1.0)), SeriesPoint::new(10, Some(2.0))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TypeError::NonMonotonicTimestamps {
                series: "m".to_string(),
                index: 1
            }
        );
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(TimeWindow::new(5, 4).is_err());
        assert!(TimeWindow::new(5, 5).unwrap().is_degenerate());
    }

    #[test]
    fn test_window_deserialize_validates() {
        let ok: TimeWindow = serde_json::from_str(r#"{"start":1,"end":2}"#).unwrap();
        assert_eq!(ok.width(), 1);
        assert!(serde_json::from_str::<TimeWindow>(r#"{"start":3,"end":2}"#).is_err());
    }

    #[test]
    fn test_windowed_keeps_closed_interval() {
        let s = series(&[(0, Some(1.0)), (10, Some(2.0)), (20, None), (30, Some(4.0))]);
        let w = TimeWindow::new(10, 20).unwrap();
        let filtered = s.windowed(&w);
        let ts: Vec<_> = filtered.timestamps().collect();
        assert_eq!(ts, vec![10, 20]);
        assert_eq!(filtered.windowed(&w), filtered);
    }

    #[test]
    fn test_windowed_outside_extent_is_empty() {
        let s = series(&[(0, Some(1.0)), (10, Some(2.0))]);
        let filtered = s.windowed(&TimeWindow::new(100, 200).unwrap());
        assert!(filtered.is_empty());
        assert_eq!(filtered.extent(), None);
    }

    #[test]
    fn test_present_runs_split_on_gaps() {
        let s = series(&[
            (0, Some(1.0)),
            (1, Some(2.0)),
            (2, None),
            (3, Some(3.0)),
            (4, None),
            (5, None),
        ]);
        let runs = s.present_runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1][0].timestamp, 3);
    }

    #[test]
    fn test_max_value_ignores_missing() {
        let s = series(&[(0, None), (1, Some(-2.0)), (2, Some(5.0))]);
        assert_eq!(s.max_value(), Some(5.0));
        assert_eq!(series(&[(0, None)]).max_value(), None);
    }

    #[test]
    fn test_intersection() {
        let a = TimeWindow::new(0, 50).unwrap();
        let b = TimeWindow::new(40, 100).unwrap();
        assert_eq!(a.intersection(&b), Some(TimeWindow::new(40, 50).unwrap()));
        let c = TimeWindow::new(200, 300).unwrap();
        assert_eq!(a.intersection(&c), None);
    }
}
