//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Backend
// ============================================================================

/// Analytics backend base URL.
pub const BACKEND_BASE_URL: &str = "http://127.0.0.1:5010";

/// HTTP client timeout for backend requests (seconds).
pub const BACKEND_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Server
// ============================================================================

/// Dashboard API bind address.
pub const SERVER_ADDR: &str = "127.0.0.1:8080";

// ============================================================================
// Window Controller
// ============================================================================

/// Default window start, as a fraction of the timeline series length (by index).
pub const DEFAULT_WINDOW_START_FRACTION: f64 = 0.3;

/// Default window end, as a fraction of the timeline series length (by index).
pub const DEFAULT_WINDOW_END_FRACTION: f64 = 0.5;

/// Manager metric the brushable timeline is drawn over.
pub const TIMELINE_METRIC: &str = "Activity_P1";

// ============================================================================
// Selection
// ============================================================================

/// Metric dimensions selected when the dashboard mounts.
pub const DEFAULT_DIMENSIONS: [&str; 6] = [
    "bytes_out",
    "cpu_speed",
    "cpu_system",
    "Missed Buffers_P1",
    "proc_run",
    "proc_total",
];

// ============================================================================
// Anomaly Recompute
// ============================================================================

/// Quiet period after the last anomaly-input change before a request is issued (ms).
///
/// 0 issues the request on the same loop turn.
pub const ANOMALY_DEBOUNCE_MS: u64 = 0;

/// |z| at which an anomaly cell is flagged as a warning.
pub const ANOMALY_WARNING_SIGMA: f64 = 3.0;

/// |z| at which an anomaly cell is flagged as critical.
pub const ANOMALY_CRITICAL_SIGMA: f64 = 5.0;

// ============================================================================
// Event Loop
// ============================================================================

/// Command channel capacity for the dashboard event loop.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Projection Panel
// ============================================================================

/// Drawn radius of a DR point (px).
pub const PROJECTION_POINT_RADIUS: f64 = 4.0;

/// Drawn radius of the hovered DR point (px).
pub const PROJECTION_HOVER_RADIUS: f64 = 7.0;

/// Pointer distance within which a DR point counts as hit (px).
pub const PROJECTION_HIT_RADIUS: f64 = 6.0;

/// Drag shorter than this is treated as a click (px).
pub const PROJECTION_DRAG_THRESHOLD_PX: f64 = 3.0;
