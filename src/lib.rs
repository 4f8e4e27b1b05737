//! farmscope: linked multi-view dashboard engine for DAQ farm monitoring
//!
//! Coordinates the views of an operator dashboard (metric timelines, a DR
//! projection scatter, a feature-contribution matrix and an MrDMD anomaly
//! heatmap) around one shared selection state.
//!
//! ## Architecture
//!
//! - **Selection Store**: the single source of truth for the time window,
//!   selected entities, hovered entity and selected dimensions
//! - **Data Cache**: the last complete snapshot of every backend dataset
//! - **Window Controller**: brush gestures to committed time windows
//! - **Renderers**: pure scene derivation per panel
//! - **Recompute Coordinator**: anomaly requests with last-writer-wins ordering
//! - **Dashboard**: owns all of the above on one event-loop task

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod recompute;
pub mod render;
pub mod selection;
pub mod types;
pub mod window;

// Re-export configuration
pub use config::DashboardConfig;

// Re-export the coordination core
pub use dashboard::{spawn_dashboard, Dashboard, DashboardError, DashboardHandle, DashboardScene};
pub use selection::{Mutation, SelectionState, SelectionStore};

// Re-export the backend boundary
pub use backend::{AnalyticsBackend, BackendError, HttpBackend};

// Re-export commonly used types
pub use types::{
    AnomalySnapshot, DrPoint, DrSnapshot, EntityId, MetricCatalog, MetricSeries, NodeTable,
    TimeWindow, Timestamp,
};
