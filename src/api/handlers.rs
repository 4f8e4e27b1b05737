//! API handlers - thin adapters from HTTP to the dashboard event loop
//!
//! All handlers return `Response` via [`ApiResponse::ok`] or an error
//! envelope. Nothing here touches dashboard state directly; every request is
//! a command on the [`DashboardHandle`].

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config;
use crate::dashboard::DashboardHandle;
use crate::recompute::RecomputePhase;
use crate::render::ProjectionGesture;
use crate::selection::Mutation;
use crate::types::EntityId;
use crate::window::BrushGesture;

// ============================================================================
// State
// ============================================================================

/// Shared state for every route.
#[derive(Clone, Debug)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    /// Name of the analytics backend, reported by `/health`
    pub backend: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dashboard: DashboardHandle, backend: impl Into<String>) -> Self {
        Self {
            dashboard,
            backend: backend.into(),
            started_at: Utc::now(),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: String,
    /// Analytics backend base URL from the process-wide config
    pub backend_url: String,
    pub uptime_secs: i64,
    pub event_loop: bool,
}

/// Brush body; `{}` is a cleared gesture.
#[derive(Debug, Default, Deserialize)]
pub struct BrushRequest {
    pub start_px: Option<f64>,
    pub end_px: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceSelectionRequest {
    pub entities: Vec<EntityId>,
}

#[derive(Debug, Deserialize)]
pub struct EntityRequest {
    pub entity: EntityId,
}

#[derive(Debug, Deserialize)]
pub struct HoverRequest {
    #[serde(default)]
    pub entity: Option<EntityId>,
}

#[derive(Debug, Deserialize)]
pub struct DimensionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BaselineEditRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub recompute: RecomputePhase,
}

// ============================================================================
// Queries
// ============================================================================

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Response {
    let event_loop = state.dashboard.status().await.is_ok();
    ApiResponse::ok(HealthResponse {
        status: if event_loop { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend.clone(),
        backend_url: config::get().backend.base_url.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        event_loop,
    })
}

/// GET /api/v1/state
pub async fn get_state(State(state): State<AppState>) -> Response {
    match state.dashboard.state().await {
        Ok(s) => ApiResponse::ok(s),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/scene
pub async fn get_scene(State(state): State<AppState>) -> Response {
    match state.dashboard.scene().await {
        Ok(scene) => ApiResponse::ok(scene),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/datasets
pub async fn get_datasets(State(state): State<AppState>) -> Response {
    match state.dashboard.status().await {
        Ok(status) => ApiResponse::ok(status),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Gestures
// ============================================================================

/// POST /api/v1/window/brush
pub async fn brush(State(state): State<AppState>, Json(req): Json<BrushRequest>) -> Response {
    let gesture = match (req.start_px, req.end_px) {
        (Some(start_px), Some(end_px)) => Some(BrushGesture { start_px, end_px }),
        (None, None) => None,
        _ => return ApiErrorResponse::bad_request("start_px and end_px must be given together"),
    };
    match state.dashboard.brush(gesture).await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/window/reset
pub async fn reset_window(State(state): State<AppState>) -> Response {
    match state.dashboard.reset_window().await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/projection/gesture
pub async fn projection_gesture(
    State(state): State<AppState>,
    Json(gesture): Json<ProjectionGesture>,
) -> Response {
    match state.dashboard.projection_gesture(gesture).await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => e.into_response(),
    }
}

async fn mutate(dashboard: &DashboardHandle, mutation: Mutation) -> Response {
    match dashboard.mutate(mutation).await {
        Ok(state) => ApiResponse::ok(state),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/selection/replace
pub async fn replace_selection(
    State(state): State<AppState>,
    Json(req): Json<ReplaceSelectionRequest>,
) -> Response {
    let entities: BTreeSet<EntityId> = req.entities.into_iter().collect();
    mutate(&state.dashboard, Mutation::ReplaceSelection { entities }).await
}

/// POST /api/v1/selection/toggle
pub async fn toggle_entity(
    State(state): State<AppState>,
    Json(req): Json<EntityRequest>,
) -> Response {
    mutate(&state.dashboard, Mutation::ToggleEntity { entity: req.entity }).await
}

/// POST /api/v1/hover
pub async fn set_hovered(State(state): State<AppState>, Json(req): Json<HoverRequest>) -> Response {
    mutate(&state.dashboard, Mutation::SetHovered { entity: req.entity }).await
}

/// POST /api/v1/dimensions/toggle
pub async fn toggle_dimension(
    State(state): State<AppState>,
    Json(req): Json<DimensionRequest>,
) -> Response {
    if req.name.trim().is_empty() {
        return ApiErrorResponse::bad_request("dimension name must not be empty");
    }
    mutate(&state.dashboard, Mutation::ToggleDimension { name: req.name }).await
}

/// POST /api/v1/baseline-edit
pub async fn set_baseline_edit_mode(
    State(state): State<AppState>,
    Json(req): Json<BaselineEditRequest>,
) -> Response {
    mutate(
        &state.dashboard,
        Mutation::SetBaselineEditMode {
            enabled: req.enabled,
        },
    )
    .await
}

/// POST /api/v1/anomaly/recompute
pub async fn force_recompute(State(state): State<AppState>) -> Response {
    match state.dashboard.force_recompute().await {
        Ok(recompute) => ApiResponse::ok(RecomputeResponse { recompute }),
        Err(e) => e.into_response(),
    }
}
