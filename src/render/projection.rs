//! Projection Renderer - DR scatter with hover, click and rectangle selection
//!
//! The coordinate mapping is derived from the DR points alone (their x/y
//! extent onto this panel's drawing area) and is never shared with another
//! panel's axes. Gestures arrive in panel pixels and are translated into
//! Selection Store mutations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{cluster_color, LinearScale, Point};
use crate::config::{PanelGeometry, ProjectionPanelConfig};
use crate::selection::{Mutation, SelectionState};
use crate::types::{ClusterId, DrPoint, DrSnapshot, EntityId};

// ============================================================================
// Mapping
// ============================================================================

/// Extent-based data-to-pixel mapping for one DR snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMapping {
    pub x: LinearScale,
    pub y: LinearScale,
}

impl ProjectionMapping {
    /// Map the points' bounding box onto the drawing area, y pointing up.
    /// A degenerate extent is padded by 0.5 either side.
    pub fn from_points(points: &[DrPoint], geometry: &PanelGeometry) -> Self {
        fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
            let (lo, hi) = values
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            if lo > hi {
                (-0.5, 0.5)
            } else if lo == hi {
                (lo - 0.5, hi + 0.5)
            } else {
                (lo, hi)
            }
        }
        Self {
            x: LinearScale::new(extent(points.iter().map(|p| p.x)), geometry.x_range()),
            y: LinearScale::new(extent(points.iter().map(|p| p.y)), geometry.y_range()),
        }
    }

    pub fn to_px(&self, point: &DrPoint) -> Point {
        Point::new(self.x.apply(point.x), self.y.apply(point.y))
    }

    /// Data coordinates under a pixel.
    pub fn to_data(&self, px: Point) -> (f64, f64) {
        (self.x.invert(px.x), self.y.invert(px.y))
    }
}

// ============================================================================
// Scene
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMark {
    pub entity: EntityId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub selected: bool,
    pub hovered: bool,
    pub cluster: ClusterId,
    /// Cluster colour; only set when a contribution matrix is present
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionScene {
    pub geometry: PanelGeometry,
    pub mapping: ProjectionMapping,
    pub marks: Vec<ProjectionMark>,
    pub colored_by_cluster: bool,
}

/// Pointer input over the scatter, in panel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionGesture {
    PointerMove { x: f64, y: f64 },
    PointerLeave,
    Click { x: f64, y: f64 },
    Drag { from: Point, to: Point },
}

// ============================================================================
// Renderer
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProjectionRenderer {
    config: ProjectionPanelConfig,
}

impl ProjectionRenderer {
    pub fn new(config: ProjectionPanelConfig) -> Self {
        Self { config }
    }

    pub fn geometry(&self) -> PanelGeometry {
        self.config.geometry()
    }

    pub fn mapping(&self, snapshot: &DrSnapshot) -> ProjectionMapping {
        ProjectionMapping::from_points(&snapshot.points, &self.geometry())
    }

    pub fn render(&self, snapshot: &DrSnapshot, state: &SelectionState) -> ProjectionScene {
        let mapping = self.mapping(snapshot);
        let colored_by_cluster = snapshot.contributions.is_some();

        let mut marks: Vec<ProjectionMark> = snapshot
            .points
            .iter()
            .map(|p| {
                let px = mapping.to_px(p);
                let hovered = state.hovered.as_ref() == Some(&p.entity);
                ProjectionMark {
                    entity: p.entity.clone(),
                    x: px.x,
                    y: px.y,
                    radius: if hovered {
                        self.config.hover_radius
                    } else {
                        self.config.point_radius
                    },
                    selected: state.selection.contains(&p.entity),
                    hovered,
                    cluster: p.cluster,
                    color: colored_by_cluster.then(|| cluster_color(p.cluster).to_string()),
                }
            })
            .collect();
        // Paint order: selected above unselected, hovered on top.
        marks.sort_by_key(|m| (m.hovered, m.selected));

        ProjectionScene {
            geometry: self.geometry(),
            mapping,
            marks,
            colored_by_cluster,
        }
    }

    /// Nearest point within the hit radius of `at`.
    pub fn hit_test(&self, snapshot: &DrSnapshot, at: Point) -> Option<EntityId> {
        let mapping = self.mapping(snapshot);
        snapshot
            .points
            .iter()
            .map(|p| (p, mapping.to_px(p).distance(&at)))
            .filter(|(_, d)| *d <= self.config.hit_radius)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(p, _)| p.entity.clone())
    }

    /// Entities whose coordinates fall inside the rectangle spanned by two
    /// corners (edges inclusive).
    pub fn entities_in_rect(&self, snapshot: &DrSnapshot, a: Point, b: Point) -> BTreeSet<EntityId> {
        let mapping = self.mapping(snapshot);
        let (ax, ay) = mapping.to_data(a);
        let (bx, by) = mapping.to_data(b);
        let (x0, x1) = (ax.min(bx), ax.max(bx));
        let (y0, y1) = (ay.min(by), ay.max(by));
        snapshot
            .points
            .iter()
            .filter(|p| (x0..=x1).contains(&p.x) && (y0..=y1).contains(&p.y))
            .map(|p| p.entity.clone())
            .collect()
    }

    /// Translate a gesture into the mutation it implies, if any.
    ///
    /// A drag shorter than the drag threshold is a click at its end point.
    /// A click on empty space changes nothing; a drag always replaces the
    /// selection, possibly with the empty set.
    pub fn gesture(
        &self,
        snapshot: &DrSnapshot,
        state: &SelectionState,
        gesture: ProjectionGesture,
    ) -> Option<Mutation> {
        match gesture {
            ProjectionGesture::PointerMove { x, y } => {
                let hit = self.hit_test(snapshot, Point::new(x, y));
                (hit != state.hovered).then_some(Mutation::SetHovered { entity: hit })
            }
            ProjectionGesture::PointerLeave => state
                .hovered
                .is_some()
                .then_some(Mutation::SetHovered { entity: None }),
            ProjectionGesture::Click { x, y } => self
                .hit_test(snapshot, Point::new(x, y))
                .map(|entity| Mutation::ToggleEntity { entity }),
            ProjectionGesture::Drag { from, to } => {
                if from.distance(&to) < self.config.drag_threshold_px {
                    return self.gesture(snapshot, state, ProjectionGesture::Click { x: to.x, y: to.y });
                }
                Some(Mutation::ReplaceSelection {
                    entities: self.entities_in_rect(snapshot, from, to),
                })
            }
        }
    }
}
