//! Dashboard Configuration Module
//!
//! Provides the dashboard configuration loaded from TOML, replacing hardcoded
//! backend addresses, window policy, default dimensions and panel geometry
//! with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `FARMSCOPE_CONFIG` environment variable (path to TOML file)
//! 2. `farmscope.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(DashboardConfig::load());
//!
//! // Anywhere in the codebase:
//! let url = &config::get().backend.base_url;
//! ```

mod dashboard_config;
pub mod defaults;
pub mod validation;

pub use dashboard_config::*;

use std::sync::OnceLock;

/// Global dashboard configuration, initialized once at startup.
static DASHBOARD_CONFIG: OnceLock<DashboardConfig> = OnceLock::new();

/// Initialize the global dashboard configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: DashboardConfig) {
    if DASHBOARD_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global dashboard configuration.
///
/// Falls back to built-in defaults when `init()` has not been called.
pub fn get() -> &'static DashboardConfig {
    DASHBOARD_CONFIG.get_or_init(DashboardConfig::default)
}
