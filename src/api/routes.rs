//! API route table
//!
//! Queries:
//! - /api/v1/health, /state, /scene, /datasets
//!
//! Gestures:
//! - /api/v1/window/{brush,reset}
//! - /api/v1/projection/gesture
//! - /api/v1/selection/{replace,toggle}, /hover, /dimensions/toggle
//! - /api/v1/baseline-edit, /anomaly/recompute

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, AppState};

/// Build the v1 API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/state", get(handlers::get_state))
        .route("/scene", get(handlers::get_scene))
        .route("/datasets", get(handlers::get_datasets))
        // Window
        .route("/window/brush", post(handlers::brush))
        .route("/window/reset", post(handlers::reset_window))
        // Projection
        .route("/projection/gesture", post(handlers::projection_gesture))
        // List widgets
        .route("/selection/replace", post(handlers::replace_selection))
        .route("/selection/toggle", post(handlers::toggle_entity))
        .route("/hover", post(handlers::set_hovered))
        .route("/dimensions/toggle", post(handlers::toggle_dimension))
        .route("/baseline-edit", post(handlers::set_baseline_edit_mode))
        // Anomaly
        .route("/anomaly/recompute", post(handlers::force_recompute))
        .with_state(state)
}
