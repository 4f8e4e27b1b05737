//! Dashboard - the top-level coordinator
//!
//! [`Dashboard`] is the synchronous core: it owns the Selection Store, Data
//! Cache, Window Controller and Recompute Coordinator, applies fetch results
//! and gestures, and derives the full scene. It never awaits; anything that
//! needs the backend comes back to the caller as a [`FetchRequest`].
//! [`event_loop`] runs it on a single task and executes those requests.

pub mod event_loop;

pub use event_loop::{spawn_dashboard, DashboardHandle, GestureOutcome, WindowOutcome};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::cache::{DataCache, DatasetInfo, DatasetKey, DatasetStatus};
use crate::config::DashboardConfig;
use crate::recompute::{RecomputeCoordinator, RecomputePhase, RecomputeRequest, RecomputeToken, ResponseOutcome};
use crate::render::contribution::{self, ContributionBar};
use crate::render::{
    timeline, AnomalyRenderer, AnomalyScene, ContributionScene, PanelScene, ProjectionGesture,
    ProjectionRenderer, ProjectionScene, SeriesRenderer, SeriesScene, TimelineScene,
};
use crate::selection::{Mutation, SelectionState, SelectionStore};
use crate::types::{
    AnomalySnapshot, DrSnapshot, EntityId, MetricCatalog, MetricSeries, NodeTable, TimeWindow,
};
use crate::window::{BrushGesture, WindowController};

/// Global message when `/mgrData` fails on initial load.
pub const METRICS_FETCH_ERROR: &str =
    "Failed to fetch manager data. Please check that the server is running.";
/// Global message when `/drTimeData` fails on initial load.
pub const PROJECTION_FETCH_ERROR: &str =
    "Failed to fetch DR data. Please check that the server is running.";
/// Global message when the initial `/nodeData` fetch fails.
pub const NODES_FETCH_ERROR: &str =
    "Failed to fetch node data. Please check that the server is running.";

// ============================================================================
// Errors / Effects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    /// A required dataset failed on initial load; the dashboard is suppressed.
    #[error("{0}")]
    Global(String),

    #[error("{0} data not loaded yet")]
    NotReady(DatasetKey),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Dashboard event loop has shut down")]
    LoopClosed,
}

/// A backend call the event loop must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Metrics,
    Projection,
    /// Initial node data for the given dimensions
    Nodes(Vec<String>),
    /// One additional node-data column
    NodeColumn(String),
    Anomaly(RecomputeRequest),
}

/// A completed backend call, fed back into the core.
#[derive(Debug)]
pub enum FetchOutcome {
    Metrics(Result<MetricCatalog, BackendError>),
    Projection(Result<DrSnapshot, BackendError>),
    Nodes(Result<NodeTable, BackendError>),
    NodeColumn {
        dimension: String,
        result: Result<NodeTable, BackendError>,
    },
    Anomaly {
        token: RecomputeToken,
        result: Result<AnomalySnapshot, BackendError>,
    },
}

// ============================================================================
// Scene
// ============================================================================

/// One row of the metric list widget with its contribution strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub name: String,
    pub selected: bool,
    pub bars: Vec<ContributionBar>,
}

/// Everything the front end draws, derived in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardScene {
    pub state: SelectionState,
    pub timeline: PanelScene<TimelineScene>,
    pub triggers: PanelScene<Vec<SeriesScene>>,
    pub performance: PanelScene<Vec<SeriesScene>>,
    pub projection: PanelScene<ProjectionScene>,
    pub features: PanelScene<Vec<FeatureEntry>>,
    pub matrix: PanelScene<Option<ContributionScene>>,
    pub anomaly: PanelScene<AnomalyScene>,
    pub recompute: RecomputePhase,
}

/// Load and recompute status, independent of the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub version: u64,
    pub global_error: Option<String>,
    pub datasets: Vec<DatasetInfo>,
    pub recompute: RecomputePhase,
    pub latest_request: Option<RecomputeToken>,
    pub nonce: u64,
    pub last_recompute_error: Option<String>,
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug)]
pub struct Dashboard {
    config: DashboardConfig,
    store: SelectionStore,
    cache: DataCache,
    window: WindowController,
    recompute: RecomputeCoordinator,
    series: SeriesRenderer,
    projection: ProjectionRenderer,
    anomaly: AnomalyRenderer,
    global_error: Option<String>,
    columns_in_flight: BTreeSet<String>,
}

impl Dashboard {
    /// Mount the dashboard: default dimensions selected, nothing loaded yet.
    pub fn new(config: DashboardConfig) -> Self {
        let mut store = SelectionStore::new();
        store.replace_dimensions(config.selection.default_dimensions.iter().cloned().collect());
        Self {
            window: WindowController::from_config(&config),
            series: SeriesRenderer::new(config.panels.series),
            projection: ProjectionRenderer::new(config.panels.projection.clone()),
            anomaly: AnomalyRenderer::new(config.panels.anomaly, &config.anomaly),
            store,
            cache: DataCache::new(),
            recompute: RecomputeCoordinator::new(),
            global_error: None,
            columns_in_flight: BTreeSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn state(&self) -> &SelectionState {
        self.store.state()
    }

    pub fn store_mut(&mut self) -> &mut SelectionStore {
        &mut self.store
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub fn recompute(&self) -> &RecomputeCoordinator {
        &self.recompute
    }

    pub fn window(&self) -> &WindowController {
        &self.window
    }

    pub fn global_error(&self) -> Option<&str> {
        self.global_error.as_deref()
    }

    pub fn datasets(&self) -> Vec<DatasetInfo> {
        self.cache.datasets()
    }

    pub fn status(&self) -> DashboardStatus {
        DashboardStatus {
            version: self.state().version,
            global_error: self.global_error.clone(),
            datasets: self.cache.datasets(),
            recompute: self.recompute.phase(),
            latest_request: self.recompute.latest(),
            nonce: self.recompute.nonce(),
            last_recompute_error: self.recompute.last_error().map(str::to_string),
        }
    }

    /// The three independent fetches of the initial load.
    pub fn initial_requests(&mut self) -> Vec<FetchRequest> {
        for key in [DatasetKey::Metrics, DatasetKey::Projection, DatasetKey::Nodes] {
            self.cache.mark_pending(key);
        }
        vec![
            FetchRequest::Metrics,
            FetchRequest::Projection,
            FetchRequest::Nodes(self.state().dimensions.iter().cloned().collect()),
        ]
    }

    fn fail_global(&mut self, key: DatasetKey, message: &str, error: &BackendError) {
        self.cache.mark_failed(key, error.to_string());
        if self.global_error.is_none() {
            self.global_error = Some(message.to_string());
        }
    }

    /// Apply a completed fetch. Returns follow-up fetches.
    pub fn apply(&mut self, outcome: FetchOutcome) -> Vec<FetchRequest> {
        match outcome {
            FetchOutcome::Metrics(Ok(catalog)) => {
                let timeline = catalog
                    .get(&self.config.window.timeline_metric)
                    .cloned()
                    .unwrap_or_else(|| {
                        warn!(metric = %self.config.window.timeline_metric, "Timeline metric missing from manager data");
                        MetricSeries::empty(&self.config.window.timeline_metric)
                    });
                info!(
                    trigger = catalog.trigger.len(),
                    performance = catalog.performance.len(),
                    unclassified = catalog.unclassified.len(),
                    "Manager metrics loaded"
                );
                self.cache.commit_metrics(catalog);
                self.window.load_series(&timeline, &mut self.store);
                Vec::new()
            }
            FetchOutcome::Metrics(Err(e)) => {
                self.fail_global(DatasetKey::Metrics, METRICS_FETCH_ERROR, &e);
                Vec::new()
            }
            FetchOutcome::Projection(Ok(snapshot)) => {
                info!(points = snapshot.points.len(), "DR data loaded");
                self.cache.commit_projection(snapshot);
                Vec::new()
            }
            FetchOutcome::Projection(Err(e)) => {
                self.fail_global(DatasetKey::Projection, PROJECTION_FETCH_ERROR, &e);
                Vec::new()
            }
            FetchOutcome::Nodes(Ok(table)) => {
                info!(rows = ?table.row_count(), columns = ?column_lengths(&table), "Node data loaded");
                self.cache.commit_nodes(table);
                self.missing_columns()
            }
            FetchOutcome::Nodes(Err(e)) => {
                self.fail_global(DatasetKey::Nodes, NODES_FETCH_ERROR, &e);
                Vec::new()
            }
            FetchOutcome::NodeColumn { dimension, result } => {
                self.columns_in_flight.remove(&dimension);
                self.apply_column(&dimension, result);
                Vec::new()
            }
            FetchOutcome::Anomaly { token, result } => {
                match self.recompute.resolve(token, result, &mut self.cache) {
                    ResponseOutcome::Committed { stamp } => {
                        info!(token = %token, stamp, "Anomaly scores committed");
                    }
                    ResponseOutcome::Stale | ResponseOutcome::Failed { .. } => {}
                }
                Vec::new()
            }
        }
    }

    /// Merge one incrementally fetched column into the node table.
    ///
    /// Failures here affect only this column.
    fn apply_column(&mut self, dimension: &str, result: Result<NodeTable, BackendError>) {
        let fetched = match result {
            Ok(table) => table,
            Err(e) => {
                warn!(dimension, error = %e, "Node column fetch failed");
                return;
            }
        };
        let Some(samples) = fetched.take_column(dimension) else {
            warn!(dimension, "Node column response lacks the requested dimension");
            return;
        };
        let current = self.cache.nodes().data().map(|t| (**t).clone()).unwrap_or_default();
        match current.with_column(dimension, samples) {
            Ok(next) => {
                debug!(dimension, "Node column added");
                self.cache.commit_nodes(next);
            }
            Err(mismatch) => warn!(error = %mismatch, "Rejected node column"),
        }
    }

    /// Column fetches for selected dimensions the node table lacks.
    fn missing_columns(&mut self) -> Vec<FetchRequest> {
        let Some(nodes) = self.cache.nodes().data().cloned() else {
            return Vec::new();
        };
        let wanted: Vec<String> = self
            .store
            .state()
            .dimensions
            .iter()
            .filter(|d| !nodes.has_column(d) && !self.columns_in_flight.contains(*d))
            .cloned()
            .collect();
        wanted
            .into_iter()
            .map(|d| {
                self.columns_in_flight.insert(d.clone());
                FetchRequest::NodeColumn(d)
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Gestures
    // ------------------------------------------------------------------------

    pub fn brush(&mut self, gesture: Option<BrushGesture>) -> Option<TimeWindow> {
        self.window.brush(gesture, &mut self.store)
    }

    pub fn reset_window(&mut self) -> Option<TimeWindow> {
        self.window.reset(&mut self.store)
    }

    /// Route a scatter gesture through the Projection Renderer.
    pub fn projection_gesture(
        &mut self,
        gesture: ProjectionGesture,
    ) -> Result<Option<Mutation>, DashboardError> {
        let snapshot = self
            .cache
            .projection()
            .data()
            .cloned()
            .ok_or(DashboardError::NotReady(DatasetKey::Projection))?;
        let mutation = self.projection.gesture(&snapshot, self.store.state(), gesture);
        if let Some(m) = &mutation {
            self.store.apply(m.clone());
        }
        Ok(mutation)
    }

    /// Apply a widget mutation. The window is owned by the Window Controller
    /// and cannot be set this way.
    pub fn mutate(&mut self, mutation: Mutation) -> Result<Vec<FetchRequest>, DashboardError> {
        if let Mutation::SetWindow { .. } = mutation {
            return Err(DashboardError::Rejected(
                "the time window is set through the brush".to_string(),
            ));
        }
        let toggled = match &mutation {
            Mutation::ToggleDimension { name } => Some(name.clone()),
            _ => None,
        };
        self.store.apply(mutation);

        let mut requests = Vec::new();
        if let Some(name) = toggled {
            let has_column = self
                .cache
                .nodes()
                .data()
                .map(|t| t.has_column(&name));
            if has_column == Some(false) && self.columns_in_flight.insert(name.clone()) {
                requests.push(FetchRequest::NodeColumn(name));
            }
        }
        Ok(requests)
    }

    /// Issue an anomaly request if the inputs changed.
    pub fn observe_anomaly_inputs(&mut self) -> Option<FetchRequest> {
        self.recompute
            .observe(self.store.state(), &mut self.cache)
            .map(FetchRequest::Anomaly)
    }

    /// Retire the in-flight anomaly request ahead of a debounced observation.
    pub fn supersede_anomaly_request(&mut self) {
        self.recompute.supersede();
    }

    /// Manual recompute with a fresh nonce.
    pub fn force_recompute(&mut self) -> Option<FetchRequest> {
        self.recompute
            .force(self.store.state(), &mut self.cache)
            .map(FetchRequest::Anomaly)
    }

    // ------------------------------------------------------------------------
    // Scene
    // ------------------------------------------------------------------------

    fn hovered_node_series(&self, metric: &str) -> Option<(EntityId, MetricSeries)> {
        let entity = self.state().hovered.clone()?;
        let nodes = self.cache.nodes().data()?;
        let series = nodes.series_for(metric, &entity)?;
        Some((entity, series))
    }

    fn series_scene(&self, series: &MetricSeries) -> SeriesScene {
        let hovered = self.hovered_node_series(series.name());
        self.series.render(
            series,
            self.state().window.as_ref(),
            hovered.as_ref().map(|(e, s)| (e, s)),
        )
    }

    /// Derive every panel from the cache and the selection state.
    pub fn scene(&self) -> Result<DashboardScene, DashboardError> {
        if let Some(message) = &self.global_error {
            return Err(DashboardError::Global(message.clone()));
        }
        let state = self.state();
        let metrics = self.cache.metrics();
        let projection = self.cache.projection();

        let timeline = PanelScene::gate(metrics, |catalog| {
            let metric = &self.config.window.timeline_metric;
            let series = catalog
                .get(metric)
                .cloned()
                .unwrap_or_else(|| MetricSeries::empty(metric));
            timeline::render(
                &series,
                self.window.axis(),
                state.window.as_ref(),
                self.config.panels.timeline,
            )
        });
        let triggers = PanelScene::gate(metrics, |catalog| {
            catalog.trigger.values().map(|s| self.series_scene(s)).collect()
        });
        let performance = PanelScene::gate(metrics, |catalog| {
            catalog
                .performance
                .values()
                .filter(|s| state.dimensions.contains(s.name()))
                .map(|s| self.series_scene(s))
                .collect()
        });

        let scatter = PanelScene::gate(projection, |snap| self.projection.render(snap, state));
        let features = PanelScene::gate(projection, |snap| {
            snap.contributions
                .as_ref()
                .map(|m| {
                    m.features
                        .iter()
                        .map(|name| FeatureEntry {
                            name: name.clone(),
                            selected: state.dimensions.contains(name),
                            bars: contribution::contribution_bars(Some(m), name),
                        })
                        .collect()
                })
                .unwrap_or_default()
        });
        let matrix = PanelScene::gate(projection, |snap| {
            contribution::render(snap, &state.dimensions, self.config.panels.matrix)
        });

        Ok(DashboardScene {
            state: state.clone(),
            timeline,
            triggers,
            performance,
            projection: scatter,
            features,
            matrix,
            anomaly: self.anomaly_scene(),
            recompute: self.recompute.phase(),
        })
    }

    fn anomaly_scene(&self) -> PanelScene<AnomalyScene> {
        let slot = self.cache.anomaly();
        let projection = self.cache.projection().data().map(|p| &**p);
        let render = |snapshot: Option<&AnomalySnapshot>| {
            self.anomaly.render(
                snapshot,
                projection,
                self.state(),
                self.recompute.is_requesting(),
                self.recompute.last_error(),
            )
        };
        match (slot.data(), slot.status()) {
            (Some(snapshot), _) => PanelScene::Ready(render(Some(&**snapshot))),
            (None, DatasetStatus::Failed { message }) => PanelScene::Failed {
                message: message.clone(),
            },
            (None, DatasetStatus::Pending) => PanelScene::Loading,
            (None, _) => PanelScene::Ready(render(None)),
        }
    }
}

/// Per-dimension row counts.
pub fn column_lengths(table: &NodeTable) -> BTreeMap<String, usize> {
    table
        .dimensions()
        .filter_map(|d| table.column(d).map(|c| (d.to_string(), c.len())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DrPoint, NodeSample, SeriesPoint};

    fn catalog() -> MetricCatalog {
        let series = |name: &str| {
            MetricSeries::new(
                name,
                (0..10).map(|i| SeriesPoint::new(i * 1000, Some(1.0))).collect(),
            )
            .unwrap()
        };
        MetricCatalog::partition([
            series("Activity_P1"),
            series("Trigger_X_P1"),
            series("bytes_out"),
            series("mem_free"),
        ])
    }

    fn projection() -> DrSnapshot {
        DrSnapshot {
            points: vec![
                DrPoint {
                    entity: EntityId::new("n1"),
                    x: 0.0,
                    y: 0.0,
                    cluster: 0,
                },
                DrPoint {
                    entity: EntityId::new("n2"),
                    x: 1.0,
                    y: 1.0,
                    cluster: 1,
                },
            ],
            contributions: None,
        }
    }

    fn column(dimension: &str, rows: usize) -> NodeTable {
        let samples = (0..rows)
            .map(|i| NodeSample {
                timestamp: i64::try_from(i).unwrap() * 1000,
                node: EntityId::new("n1"),
                value: Some(2.0),
            })
            .collect();
        NodeTable::from_columns([(dimension.to_string(), samples)].into_iter().collect()).unwrap()
    }

    fn loaded() -> Dashboard {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.initial_requests();
        d.apply(FetchOutcome::Metrics(Ok(catalog())));
        d.apply(FetchOutcome::Projection(Ok(projection())));
        d.apply(FetchOutcome::Nodes(Ok(column("bytes_out", 10))));
        d
    }

    #[test]
    fn test_mount_selects_default_dimensions() {
        let d = Dashboard::new(DashboardConfig::default());
        assert_eq!(d.state().dimensions.len(), 6);
        assert!(d.state().dimensions.contains("Missed Buffers_P1"));
        assert!(d.state().window.is_none());
    }

    #[test]
    fn test_panels_gate_independently() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.initial_requests();
        d.apply(FetchOutcome::Projection(Ok(projection())));
        let scene = d.scene().unwrap();
        assert!(scene.projection.ready().is_some());
        assert_eq!(scene.timeline, PanelScene::Loading);
        assert_eq!(scene.triggers, PanelScene::Loading);
    }

    #[test]
    fn test_metrics_failure_is_global() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.initial_requests();
        d.apply(FetchOutcome::Projection(Ok(projection())));
        d.apply(FetchOutcome::Metrics(Err(BackendError::Malformed {
            endpoint: "mgrData",
            message: "x".into(),
        })));
        assert_eq!(
            d.scene().unwrap_err(),
            DashboardError::Global(METRICS_FETCH_ERROR.to_string())
        );
    }

    #[test]
    fn test_metrics_load_sets_default_window() {
        let d = loaded();
        let w = d.state().window.unwrap();
        assert_eq!((w.start(), w.end()), (3000, 5000));
        let scene = d.scene().unwrap();
        let timeline = scene.timeline.ready().unwrap();
        assert!(timeline.brush.is_some());
    }

    #[test]
    fn test_performance_panels_follow_dimensions() {
        let mut d = loaded();
        let names = |d: &Dashboard| -> Vec<String> {
            d.scene()
                .unwrap()
                .performance
                .ready()
                .unwrap()
                .iter()
                .map(|s| s.metric.clone())
                .collect()
        };
        assert_eq!(names(&d), vec!["bytes_out"]);
        d.mutate(Mutation::ToggleDimension {
            name: "mem_free".into(),
        })
        .unwrap();
        assert_eq!(names(&d), vec!["bytes_out", "mem_free"]);
        let triggers = d.scene().unwrap().triggers;
        assert_eq!(triggers.ready().unwrap().len(), 1);
    }

    #[test]
    fn test_initial_nodes_requests_missing_selected_columns() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.initial_requests();
        let follow = d.apply(FetchOutcome::Nodes(Ok(column("bytes_out", 4))));
        assert_eq!(follow.len(), 5);
        assert!(follow.contains(&FetchRequest::NodeColumn("proc_run".into())));
    }

    #[test]
    fn test_toggle_dimension_fetches_absent_column_once() {
        let mut d = loaded();
        let first = d
            .mutate(Mutation::ToggleDimension {
                name: "mem_free".into(),
            })
            .unwrap();
        assert_eq!(first, vec![FetchRequest::NodeColumn("mem_free".into())]);
        let again = d
            .mutate(Mutation::ToggleDimension {
                name: "mem_free".into(),
            })
            .unwrap();
        assert!(again.is_empty());
        // The toggle applies regardless of the fetch.
        assert!(!d.state().dimensions.contains("mem_free"));
    }

    #[test]
    fn test_column_with_wrong_length_is_rejected() {
        let mut d = loaded();
        d.apply(FetchOutcome::NodeColumn {
            dimension: "mem_free".into(),
            result: Ok(column("mem_free", 3)),
        });
        assert!(!d.cache().nodes().data().unwrap().has_column("mem_free"));

        d.apply(FetchOutcome::NodeColumn {
            dimension: "mem_free".into(),
            result: Ok(column("mem_free", 10)),
        });
        let nodes = d.cache().nodes().data().unwrap();
        assert!(nodes.has_column("mem_free"));
        assert_eq!(column_lengths(nodes)["mem_free"], 10);
    }

    #[test]
    fn test_column_failure_is_local() {
        let mut d = loaded();
        d.apply(FetchOutcome::NodeColumn {
            dimension: "mem_free".into(),
            result: Err(BackendError::Url("down".into())),
        });
        assert!(d.global_error().is_none());
        assert!(d.scene().is_ok());
    }

    #[test]
    fn test_set_window_mutation_rejected() {
        let mut d = loaded();
        let err = d
            .mutate(Mutation::SetWindow {
                window: TimeWindow::new(0, 1).unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, DashboardError::Rejected(_)));
    }

    #[test]
    fn test_projection_click_then_anomaly_request() {
        let mut d = loaded();
        assert!(d.observe_anomaly_inputs().is_none());

        let geometry = d.config().panels.projection.geometry();
        let (left, _) = geometry.x_range();
        let (bottom, _) = geometry.y_range();
        let m = d
            .projection_gesture(ProjectionGesture::Click { x: left, y: bottom })
            .unwrap();
        assert_eq!(
            m,
            Some(Mutation::ToggleEntity {
                entity: EntityId::new("n1")
            })
        );
        let Some(FetchRequest::Anomaly(req)) = d.observe_anomaly_inputs() else {
            panic!("expected an anomaly request");
        };
        assert_eq!(req.key.entities.len(), 1);
        let scene = d.scene().unwrap();
        assert_eq!(scene.anomaly, PanelScene::Loading);
    }

    #[test]
    fn test_hover_overlay_from_node_data() {
        let mut d = loaded();
        d.mutate(Mutation::SetHovered {
            entity: Some(EntityId::new("n1")),
        })
        .unwrap();
        let scene = d.scene().unwrap();
        let perf = scene.performance.ready().unwrap();
        let overlay = perf[0].hover.as_ref().unwrap();
        assert_eq!(overlay.entity, EntityId::new("n1"));
        assert!(!overlay.segments.is_empty());
    }
}
