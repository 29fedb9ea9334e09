use std::time::Duration;

/// Quiet period before a scheduled fetch is issued
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;
/// Zoom level used when the view recenters on a fresh track
pub const DEFAULT_RECENTER_ZOOM: u8 = 15;
pub const DEFAULT_PAN_DURATION_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Result-count limits offered to the operator
pub const RESULT_LIMIT_PRESETS: [u32; 3] = [1, 10, 100];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub quiet_period: Duration,
    pub recenter_zoom: u8,
    /// `None` disables the animated pan on recenter
    pub pan_duration: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            recenter_zoom: DEFAULT_RECENTER_ZOOM,
            pan_duration: Some(Duration::from_secs(DEFAULT_PAN_DURATION_SECS)),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}
