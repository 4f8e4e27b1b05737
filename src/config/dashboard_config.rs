//! Dashboard Configuration - backend, window policy, selection defaults and panel geometry
//!
//! Each struct implements `Default` with the built-in values from
//! [`super::defaults`], so a missing config file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FARMSCOPE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "farmscope.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a dashboard deployment.
///
/// Load with `DashboardConfig::load()` which searches:
/// 1. `$FARMSCOPE_CONFIG` env var
/// 2. `./farmscope.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Analytics backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Dashboard API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Window controller policy
    #[serde(default)]
    pub window: WindowConfig,

    /// Selection defaults applied at mount
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Anomaly recompute and classification
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Pixel geometry of every panel
    #[serde(default)]
    pub panels: PanelsConfig,
}

impl DashboardConfig {
    /// Load configuration using the standard search order:
    /// 1. `$FARMSCOPE_CONFIG` environment variable
    /// 2. `./farmscope.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), backend = %config.backend.base_url, "Loaded dashboard config from FARMSCOPE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from FARMSCOPE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "FARMSCOPE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(backend = %config.backend.base_url, "Loaded dashboard config from ./farmscope.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./farmscope.toml, using defaults");
                }
            }
        }

        info!("No farmscope.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Window fractions lie in [0, 1] with start < end
    /// - Panel geometry leaves a positive drawing area
    /// - critical_sigma > warning_sigma > 0
    /// - Backend URL parses and the timeout is non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let w = &self.window;
        for (name, value) in [
            ("window.default_start_fraction", w.default_start_fraction),
            ("window.default_end_fraction", w.default_end_fraction),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} ({value}) must be within [0, 1]"));
            }
        }
        if w.default_start_fraction >= w.default_end_fraction {
            errors.push(format!(
                "window.default_start_fraction ({:.2}) must be < default_end_fraction ({:.2})",
                w.default_start_fraction, w.default_end_fraction
            ));
        }
        if w.timeline_metric.trim().is_empty() {
            errors.push("window.timeline_metric must not be empty".to_string());
        }

        let a = &self.anomaly;
        if !a.warning_sigma.is_finite() || a.warning_sigma <= 0.0 {
            errors.push("anomaly.warning_sigma must be > 0".to_string());
        }
        if !a.critical_sigma.is_finite() || a.critical_sigma <= a.warning_sigma {
            errors.push(format!(
                "anomaly.critical_sigma ({:.1}) must be > warning_sigma ({:.1})",
                a.critical_sigma, a.warning_sigma
            ));
        }

        if self.backend.timeout_secs == 0 {
            errors.push("backend.timeout_secs must be > 0".to_string());
        }
        if reqwest::Url::parse(&self.backend.base_url).is_err() {
            errors.push(format!(
                "backend.base_url '{}' is not a valid URL",
                self.backend.base_url
            ));
        }

        let p = &self.panels;
        for (name, geometry) in [
            ("panels.timeline", &p.timeline),
            ("panels.series", &p.series),
            ("panels.projection", &p.projection.geometry()),
            ("panels.matrix", &p.matrix),
            ("panels.anomaly", &p.anomaly),
        ] {
            geometry.check(name, &mut errors);
        }
        let proj = &p.projection;
        if proj.point_radius <= 0.0 || proj.hover_radius <= 0.0 || proj.hit_radius <= 0.0 {
            errors.push("panels.projection radii must be > 0".to_string());
        }
        if proj.drag_threshold_px < 0.0 {
            errors.push("panels.projection.drag_threshold_px must be >= 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Backend / Server
// ============================================================================

/// Analytics backend connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BACKEND_BASE_URL.to_string(),
            timeout_secs: defaults::BACKEND_TIMEOUT_SECS,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

// ============================================================================
// Window / Selection / Anomaly
// ============================================================================

/// Default-window policy and the series the brush is drawn over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub default_start_fraction: f64,
    pub default_end_fraction: f64,
    pub timeline_metric: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_start_fraction: defaults::DEFAULT_WINDOW_START_FRACTION,
            default_end_fraction: defaults::DEFAULT_WINDOW_END_FRACTION,
            timeline_metric: defaults::TIMELINE_METRIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub default_dimensions: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            default_dimensions: defaults::DEFAULT_DIMENSIONS
                .iter()
                .map(|d| (*d).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub debounce_ms: u64,
    pub warning_sigma: f64,
    pub critical_sigma: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::ANOMALY_DEBOUNCE_MS,
            warning_sigma: defaults::ANOMALY_WARNING_SIGMA,
            critical_sigma: defaults::ANOMALY_CRITICAL_SIGMA,
        }
    }
}

// ============================================================================
// Panel Geometry
// ============================================================================

/// Pixel size and margins of one panel.
///
/// Keys omitted from a partial table take the generic defaults below, not
/// the panel-specific ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelGeometry {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
}

impl Default for PanelGeometry {
    fn default() -> Self {
        Self::new(600.0, 200.0, 20.0, 20.0, 20.0, 20.0)
    }
}

impl PanelGeometry {
    pub const fn new(
        width: f64,
        height: f64,
        margin_top: f64,
        margin_right: f64,
        margin_bottom: f64,
        margin_left: f64,
    ) -> Self {
        Self {
            width,
            height,
            margin_top,
            margin_right,
            margin_bottom,
            margin_left,
        }
    }

    /// Horizontal drawing range `(left, right)` inside the margins.
    pub fn x_range(&self) -> (f64, f64) {
        (self.margin_left, self.width - self.margin_right)
    }

    /// Vertical drawing range `(bottom, top)`; screen y grows downwards.
    pub fn y_range(&self) -> (f64, f64) {
        (self.height - self.margin_bottom, self.margin_top)
    }

    fn check(&self, name: &str, errors: &mut Vec<String>) {
        let values = [
            self.width,
            self.height,
            self.margin_top,
            self.margin_right,
            self.margin_bottom,
            self.margin_left,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            errors.push(format!("{name}: sizes and margins must be finite and >= 0"));
            return;
        }
        if self.width - self.margin_left - self.margin_right <= 0.0
            || self.height - self.margin_top - self.margin_bottom <= 0.0
        {
            errors.push(format!(
                "{name}: margins leave no drawing area ({}x{})",
                self.width, self.height
            ));
        }
    }
}

/// Scatter panel geometry plus point and interaction sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionPanelConfig {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
    pub point_radius: f64,
    pub hover_radius: f64,
    pub hit_radius: f64,
    pub drag_threshold_px: f64,
}

impl Default for ProjectionPanelConfig {
    fn default() -> Self {
        Self {
            width: 350.0,
            height: 350.0,
            margin: 20.0,
            point_radius: defaults::PROJECTION_POINT_RADIUS,
            hover_radius: defaults::PROJECTION_HOVER_RADIUS,
            hit_radius: defaults::PROJECTION_HIT_RADIUS,
            drag_threshold_px: defaults::PROJECTION_DRAG_THRESHOLD_PX,
        }
    }
}

impl ProjectionPanelConfig {
    pub fn geometry(&self) -> PanelGeometry {
        PanelGeometry::new(
            self.width,
            self.height,
            self.margin,
            self.margin,
            self.margin,
            self.margin,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelsConfig {
    #[serde(default = "default_timeline_geometry")]
    pub timeline: PanelGeometry,
    #[serde(default = "default_series_geometry")]
    pub series: PanelGeometry,
    #[serde(default)]
    pub projection: ProjectionPanelConfig,
    #[serde(default = "default_matrix_geometry")]
    pub matrix: PanelGeometry,
    #[serde(default = "default_anomaly_geometry")]
    pub anomaly: PanelGeometry,
}

fn default_timeline_geometry() -> PanelGeometry {
    PanelGeometry::new(600.0, 140.0, 10.0, 30.0, 70.0, 30.0)
}
fn default_series_geometry() -> PanelGeometry {
    PanelGeometry::new(600.0, 100.0, 10.0, 30.0, 20.0, 40.0)
}
fn default_matrix_geometry() -> PanelGeometry {
    PanelGeometry::new(300.0, 350.0, 30.0, 10.0, 10.0, 110.0)
}
fn default_anomaly_geometry() -> PanelGeometry {
    PanelGeometry::new(700.0, 380.0, 50.0, 40.0, 20.0, 20.0)
}

impl Default for PanelsConfig {
    fn default() -> Self {
        Self {
            timeline: default_timeline_geometry(),
            series: default_series_geometry(),
            projection: ProjectionPanelConfig::default(),
            matrix: default_matrix_geometry(),
            anomaly: default_anomaly_geometry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        DashboardConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let toml_str = DashboardConfig::default().to_toml().unwrap();
        let parsed = DashboardConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.window.timeline_metric, "Activity_P1");
        assert_eq!(parsed.selection.default_dimensions.len(), 6);
        assert_eq!(parsed.panels.timeline, default_timeline_geometry());
    }

    #[test]
    fn test_inverted_fractions_rejected() {
        let mut cfg = DashboardConfig::default();
        cfg.window.default_start_fraction = 0.6;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("default_start_fraction"));
    }

    #[test]
    fn test_sigma_ordering_rejected() {
        let mut cfg = DashboardConfig::default();
        cfg.anomaly.critical_sigma = 2.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_geometry_ranges() {
        let g = default_timeline_geometry();
        assert_eq!(g.x_range(), (30.0, 570.0));
        assert_eq!(g.y_range(), (70.0, 10.0));
    }
}
